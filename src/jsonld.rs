//! schema.org `JobPosting` extraction from `application/ld+json` blocks.

use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::{non_empty, PartialJob};
use crate::normalize::{extract_location, normalize_salary_json};

static LD_JSON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid ld+json selector")
});

/// First `JobPosting` found in the document's structured-data blocks.
///
/// Blocks that fail to parse are skipped; they never stop the scan.
pub fn extract_job_posting(document: &Html) -> Option<PartialJob> {
    for (index, script) in document.select(&LD_JSON).enumerate() {
        let raw: String = script.text().collect();
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let parsed: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                debug!("JSON-LD parse error in block {}: {}", index, e);
                continue;
            }
        };

        if let Some(posting) = candidates(&parsed).into_iter().find(|item| is_job_posting(item)) {
            return Some(posting_to_partial(posting));
        }
    }
    None
}

/// Top-level objects of a block: the block itself, array items, or `@graph` members.
fn candidates(block: &Value) -> Vec<&Value> {
    let items: Vec<&Value> = match block {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    items
        .into_iter()
        .flat_map(|item| match item.get("@graph").and_then(Value::as_array) {
            Some(graph) => graph.iter().collect::<Vec<_>>(),
            None => vec![item],
        })
        .collect()
}

fn is_job_posting(item: &Value) -> bool {
    let declared = item.get("@type").or_else(|| item.get("type"));
    match declared {
        Some(Value::String(t)) => t == "JobPosting",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("JobPosting")),
        _ => false,
    }
}

fn posting_to_partial(item: &Value) -> PartialJob {
    let organization = item.get("hiringOrganization");
    let (company, company_url) = match organization {
        Some(Value::String(name)) => (non_empty(name), None),
        Some(org) => (text_field(org, "name"), text_field(org, "url")),
        None => (None, None),
    };

    PartialJob {
        title: text_field(item, "title").or_else(|| text_field(item, "name")),
        company,
        company_url,
        location: item.get("jobLocation").and_then(extract_location),
        employment_type: item.get("employmentType").and_then(joined_text),
        salary: item.get("baseSalary").and_then(normalize_salary_json),
        date_posted: text_field(item, "datePosted"),
        valid_through: text_field(item, "validThrough"),
        description_html: text_field(item, "description"),
    }
}

fn text_field(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).and_then(non_empty)
}

/// String value, or comma-joined strings for arrays like `["FULL_TIME", "PART_TIME"]`.
pub fn joined_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(joined_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(blocks: &[&str]) -> Html {
        let scripts: String = blocks
            .iter()
            .map(|b| format!(r#"<script type="application/ld+json">{}</script>"#, b))
            .collect();
        Html::parse_document(&format!("<html><head>{}</head><body><h1>x</h1></body></html>", scripts))
    }

    const POSTING: &str = r#"{
        "@context": "https://schema.org",
        "@type": "JobPosting",
        "title": "Rust Entwickler (m/w/d)",
        "hiringOrganization": { "@type": "Organization", "name": "Acme GmbH", "url": "https://acme.example" },
        "datePosted": "2024-05-02",
        "validThrough": "2024-07-01",
        "description": "<p>Spannende Aufgaben</p>",
        "employmentType": ["FULL_TIME", "PART_TIME"],
        "jobLocation": { "@type": "Place", "address": { "addressLocality": "München", "addressRegion": "Bayern", "addressCountry": "DE" } },
        "baseSalary": { "currency": "EUR", "value": { "minValue": 55000, "maxValue": 70000 } }
    }"#;

    #[test]
    fn test_extracts_job_posting_fields() {
        let doc = page(&[POSTING]);
        let job = extract_job_posting(&doc).expect("posting found");
        assert_eq!(job.title.as_deref(), Some("Rust Entwickler (m/w/d)"));
        assert_eq!(job.company.as_deref(), Some("Acme GmbH"));
        assert_eq!(job.company_url.as_deref(), Some("https://acme.example"));
        assert_eq!(job.location.as_deref(), Some("München, Bayern, DE"));
        assert_eq!(job.employment_type.as_deref(), Some("FULL_TIME, PART_TIME"));
        assert_eq!(job.salary.as_deref(), Some("55,000 - 70,000 EUR"));
        assert_eq!(job.date_posted.as_deref(), Some("2024-05-02"));
        assert_eq!(job.valid_through.as_deref(), Some("2024-07-01"));
        assert_eq!(job.description_html.as_deref(), Some("<p>Spannende Aufgaben</p>"));
    }

    #[test]
    fn test_malformed_block_does_not_stop_scan() {
        let doc = page(&["{ this is not json", r#"{"@type": "Organization", "name": "x"}"#, POSTING]);
        let job = extract_job_posting(&doc).expect("later block still found");
        assert_eq!(job.company.as_deref(), Some("Acme GmbH"));
    }

    #[test]
    fn test_type_array_and_graph_and_name_fallback() {
        let in_array = r#"[{"@type": "BreadcrumbList"}, {"@type": ["Thing", "JobPosting"], "name": "Data Engineer"}]"#;
        let job = extract_job_posting(&page(&[in_array])).unwrap();
        assert_eq!(job.title.as_deref(), Some("Data Engineer"));

        let graph = r#"{"@graph": [{"@type": "WebPage"}, {"@type": "JobPosting", "title": "SRE", "hiringOrganization": "Solo AG"}]}"#;
        let job = extract_job_posting(&page(&[graph])).unwrap();
        assert_eq!(job.title.as_deref(), Some("SRE"));
        assert_eq!(job.company.as_deref(), Some("Solo AG"));
        assert_eq!(job.company_url, None);
    }

    #[test]
    fn test_markup_and_entities_stay_raw() {
        let block = r#"{
            "@type": "JobPosting",
            "title": "Koch <m/w/d>",
            "hiringOrganization": { "name": "Müller & Söhne" },
            "description": "<p>Hallo</p>"
        }"#;
        let job = extract_job_posting(&page(&[block])).unwrap();
        assert_eq!(job.title.as_deref(), Some("Koch <m/w/d>"));
        assert_eq!(job.company.as_deref(), Some("Müller & Söhne"));
        assert_eq!(job.description_html.as_deref(), Some("<p>Hallo</p>"));

        let layers = crate::assemble::JobLayers { structured: Some(job), ..Default::default() };
        let record = crate::assemble::assemble("https://www.kununu.com/de/job/1", &layers);
        assert_eq!(record.description_text.as_deref(), Some("Hallo"));
    }

    #[test]
    fn test_no_posting_returns_none() {
        assert!(extract_job_posting(&page(&[])).is_none());
        assert!(extract_job_posting(&page(&["[]", r#"{"@type": "Organization"}"#, "oops"])).is_none());
    }
}

//! Selector-based fallbacks for detail pages, and job-link discovery on listing pages.
//!
//! Selector lists are broad on purpose (class substrings) since the site's
//! markup changes between releases.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::{Field, PartialJob, SalaryInput};
use crate::normalize::normalize_salary;

pub const SITE_ROOT: &str = "https://www.kununu.com";
pub const JOB_DETAIL_PATH: &str = "/de/job/";

const TITLE_SELECTORS: &[&str] = &["h1", "[class*='jobTitle']", "[class*='job-title']"];
const COMPANY_SELECTORS: &[&str] = &["[class*='company']", "[data-testid*='company']"];
const LOCATION_SELECTORS: &[&str] = &["[class*='location']", "[class*='Location']"];
const EMPLOYMENT_TYPE_SELECTORS: &[&str] = &["[class*='employmentType']", "[class*='job-type']"];
const SALARY_SELECTORS: &[&str] = &["[class*='salary']", "[class*='Salary']"];
const DESCRIPTION_SELECTORS: &[&str] = &[
    "[class*='job-description']",
    "[class*='jobDescription']",
    "[class*='description']",
];

/// Fill the requested fields from page markup.
///
/// Fields with no matching element stay `None`. Fields not requested are never looked up.
pub fn extract_fallback(document: &Html, wanted: &[Field]) -> PartialJob {
    let mut found = PartialJob::default();

    for field in wanted {
        let value = match field {
            Field::Title => first_text(document, TITLE_SELECTORS),
            Field::Company => first_text(document, COMPANY_SELECTORS),
            Field::Location => first_text(document, LOCATION_SELECTORS),
            Field::EmploymentType => first_text(document, EMPLOYMENT_TYPE_SELECTORS),
            Field::Salary => first_text(document, SALARY_SELECTORS)
                .and_then(|raw| normalize_salary(&SalaryInput::FreeText(raw))),
            Field::DescriptionHtml => first_inner_html(document, DESCRIPTION_SELECTORS),
            Field::CompanyUrl | Field::DatePosted | Field::ValidThrough => None,
        };
        *found.slot(*field) = value;
    }

    found
}

/// Text of the first element with non-blank text, trying selectors in order.
pub fn first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    first_match(document, selectors, |el| {
        let text: String = el.text().collect();
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (!collapsed.is_empty()).then_some(collapsed)
    })
}

fn first_inner_html(document: &Html, selectors: &[&str]) -> Option<String> {
    first_match(document, selectors, |el| {
        let inner = el.inner_html();
        let inner = inner.trim();
        (!inner.is_empty()).then(|| inner.to_string())
    })
}

fn first_match<F>(document: &Html, selectors: &[&str], mut pick: F) -> Option<String>
where
    F: FnMut(ElementRef<'_>) -> Option<String>,
{
    for selector_str in selectors {
        let Ok(selector) = Selector::parse(selector_str) else { continue };
        if let Some(value) = document.select(&selector).find_map(&mut pick) {
            return Some(value);
        }
    }
    None
}

/// Absolute job-detail URLs linked from a listing page, in document order, without repeats.
pub fn job_links(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse(&format!("a[href*='{}']", JOB_DETAIL_PATH)) else {
        return Vec::new();
    };
    let Ok(root) = Url::parse(SITE_ROOT) else {
        return Vec::new();
    };

    let mut links: Vec<String> = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else { continue };
        let Ok(resolved) = root.join(href) else { continue };
        let resolved = resolved.to_string();
        if resolved.contains(JOB_DETAIL_PATH) && !links.contains(&resolved) {
            links.push(resolved);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r#"
        <html><body>
          <div class="header"><h1>  Senior   Backend Engineer </h1></div>
          <div class="company-name"><a href="/de/acme">Acme GmbH</a></div>
          <span class="jobLocation">Hamburg</span>
          <span class="job-type">Vollzeit</span>
          <div class="salary-box">50.000 - 65.000 €</div>
          <section class="job-description"><p>Du baust <b>Dinge</b>.</p></section>
        </body></html>"#;

    #[test]
    fn test_fallback_fills_requested_fields() {
        let doc = Html::parse_document(DETAIL);
        let found = extract_fallback(&doc, &Field::ALL);
        assert_eq!(found.title.as_deref(), Some("Senior Backend Engineer"));
        assert_eq!(found.company.as_deref(), Some("Acme GmbH"));
        assert_eq!(found.location.as_deref(), Some("Hamburg"));
        assert_eq!(found.employment_type.as_deref(), Some("Vollzeit"));
        assert_eq!(found.salary.as_deref(), Some("50,000 - 65,000 EUR"));
        assert_eq!(found.description_html.as_deref(), Some("<p>Du baust <b>Dinge</b>.</p>"));
        assert_eq!(found.company_url, None);
    }

    #[test]
    fn test_fallback_skips_fields_not_requested() {
        let doc = Html::parse_document(DETAIL);
        let found = extract_fallback(&doc, &[Field::Location]);
        assert_eq!(found.location.as_deref(), Some("Hamburg"));
        assert_eq!(found.title, None);
        assert_eq!(found.salary, None);
    }

    #[test]
    fn test_fallback_tolerates_bare_page() {
        let doc = Html::parse_document("<html><body><p>nothing here</p></body></html>");
        assert_eq!(extract_fallback(&doc, &Field::ALL), PartialJob::default());
    }

    #[test]
    fn test_first_text_skips_blank_matches() {
        let doc = Html::parse_document(r#"<h1>   </h1><div class="jobTitle">Tester</div>"#);
        assert_eq!(first_text(&doc, TITLE_SELECTORS), Some("Tester".to_string()));
    }

    #[test]
    fn test_first_text_concatenates_inline_nodes() {
        let doc = Html::parse_document(
            r#"<h1>Senior<span>Dev</span></h1><div class="salary">60.<b>000</b> €</div>"#,
        );
        assert_eq!(first_text(&doc, TITLE_SELECTORS), Some("SeniorDev".to_string()));
        let found = extract_fallback(&doc, &[Field::Salary]);
        assert_eq!(found.salary.as_deref(), Some("60,000 EUR"));
    }

    #[test]
    fn test_job_links_resolve_and_dedupe() {
        let doc = Html::parse_document(
            r#"<ul>
                <li><a href="/de/job/123-rust-dev">Rust Dev</a></li>
                <li><a href="/de/job/123-rust-dev">Rust Dev (again)</a></li>
                <li><a href="https://www.kununu.com/de/job/456">Other</a></li>
                <li><a href="/de/jobs?page=2">Next</a></li>
                <li><a href="/de/acme">Company</a></li>
            </ul>"#,
        );
        assert_eq!(
            job_links(&doc),
            vec![
                "https://www.kununu.com/de/job/123-rust-dev".to_string(),
                "https://www.kununu.com/de/job/456".to_string(),
            ]
        );
    }
}

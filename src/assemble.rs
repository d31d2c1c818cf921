//! Merging per-source job data into one output record.

use crate::models::{Field, JobRecord, JobSource, PartialJob};
use crate::normalize::clean_text;

/// Origins of job data, highest precedence first.
pub const PRECEDENCE: [Origin; 3] = [Origin::Api, Origin::StructuredData, Origin::HtmlFallback];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Api,
    StructuredData,
    HtmlFallback,
}

/// Each source's contribution to one job.
#[derive(Debug, Clone, Default)]
pub struct JobLayers {
    pub api: Option<PartialJob>,
    pub structured: Option<PartialJob>,
    pub html: Option<PartialJob>,
}

impl JobLayers {
    fn layer(&self, origin: Origin) -> Option<&PartialJob> {
        match origin {
            Origin::Api => self.api.as_ref(),
            Origin::StructuredData => self.structured.as_ref(),
            Origin::HtmlFallback => self.html.as_ref(),
        }
    }

    /// Where `field` comes from: the first origin in [`PRECEDENCE`] that has it.
    pub fn origin_of(&self, field: Field) -> Option<Origin> {
        PRECEDENCE
            .into_iter()
            .find(|origin| self.layer(*origin).and_then(|l| l.get(field)).is_some())
    }

    /// Field-by-field merge, each field taken independently from its best origin.
    pub fn merged(&self) -> PartialJob {
        let mut merged = PartialJob::default();
        for field in Field::ALL {
            *merged.slot(field) = self
                .origin_of(field)
                .and_then(|origin| self.layer(origin))
                .and_then(|layer| layer.get(field))
                .cloned();
        }
        merged
    }
}

/// Final record for `url`. `description_text` is always derived from the merged HTML.
pub fn assemble(url: &str, layers: &JobLayers) -> JobRecord {
    let merged = layers.merged();
    let description_text = merged
        .description_html
        .as_deref()
        .map(clean_text)
        .filter(|text| !text.is_empty());

    let source = match (&layers.api, layers.structured.is_some() || layers.html.is_some()) {
        (Some(_), true) => JobSource::Merged,
        (Some(_), false) => JobSource::Api,
        (None, _) => JobSource::Kununu,
    };

    JobRecord {
        title: merged.title,
        company: merged.company,
        company_url: merged.company_url,
        location: merged.location,
        employment_type: merged.employment_type,
        salary: merged.salary,
        date_posted: merged.date_posted,
        valid_through: merged.valid_through,
        description_html: merged.description_html,
        description_text,
        url: url.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(location: Option<&str>, title: Option<&str>) -> PartialJob {
        PartialJob {
            location: location.map(String::from),
            title: title.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_api_location_beats_structured() {
        let layers = JobLayers {
            api: Some(partial(Some("Berlin"), None)),
            structured: Some(partial(Some("Munich"), Some("Rust Engineer"))),
            html: None,
        };
        let record = assemble("https://www.kununu.com/de/job/1", &layers);
        assert_eq!(record.location.as_deref(), Some("Berlin"));
        // field-wise: the title still comes from structured data
        assert_eq!(record.title.as_deref(), Some("Rust Engineer"));
        assert_eq!(record.source, JobSource::Merged);
    }

    #[test]
    fn test_html_fallback_only_fills_gaps() {
        let layers = JobLayers {
            api: None,
            structured: Some(partial(None, Some("Structured Title"))),
            html: Some(partial(Some("Hamburg"), Some("H1 Title"))),
        };
        assert_eq!(layers.origin_of(Field::Title), Some(Origin::StructuredData));
        assert_eq!(layers.origin_of(Field::Location), Some(Origin::HtmlFallback));
        assert_eq!(layers.origin_of(Field::Salary), None);

        let record = assemble("https://www.kununu.com/de/job/2", &layers);
        assert_eq!(record.title.as_deref(), Some("Structured Title"));
        assert_eq!(record.location.as_deref(), Some("Hamburg"));
        assert_eq!(record.source, JobSource::Kununu);
    }

    #[test]
    fn test_description_text_is_derived() {
        let layers = JobLayers {
            structured: Some(PartialJob {
                description_html: Some("<p>Hallo</p><script>x()</script><p> Welt</p>".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let record = assemble("u", &layers);
        assert_eq!(record.description_text.as_deref(), Some("Hallo Welt"));

        let empty = assemble("u", &JobLayers::default());
        assert_eq!(empty.description_text, None);
        assert_eq!(empty.url, "u");
    }

    #[test]
    fn test_api_only_source() {
        let layers = JobLayers { api: Some(partial(None, Some("T"))), ..Default::default() };
        assert_eq!(assemble("u", &layers).source, JobSource::Api);
    }
}

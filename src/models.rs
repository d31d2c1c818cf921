use serde::{Deserialize, Serialize};

/// Search filters shared by the API query and the HTML search URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    pub title: String,
    pub location: String,
    pub home_office: bool,
    pub employment_type: String,
    pub career_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSource {
    Api,
    Kununu,
    Merged,
}

/// One finished job posting, as written to the sink.
///
/// Field names are the output contract; every field except `url` is nullable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub title: Option<String>,
    pub company: Option<String>,
    pub company_url: Option<String>,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub salary: Option<String>,
    pub date_posted: Option<String>,
    pub valid_through: Option<String>,
    pub description_html: Option<String>,
    pub description_text: Option<String>,
    pub url: String,
    pub source: JobSource,
}

impl JobRecord {
    /// Record with only the URL known (listing crawl without detail fetches).
    pub fn stub(url: impl Into<String>) -> Self {
        Self {
            title: None,
            company: None,
            company_url: None,
            location: None,
            employment_type: None,
            salary: None,
            date_posted: None,
            valid_through: None,
            description_html: None,
            description_text: None,
            url: url.into(),
            source: JobSource::Kununu,
        }
    }
}

/// Field-wise accumulator for one source's view of a job.
///
/// Empty strings never make it in here; use [`non_empty`] when filling it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialJob {
    pub title: Option<String>,
    pub company: Option<String>,
    pub company_url: Option<String>,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub salary: Option<String>,
    pub date_posted: Option<String>,
    pub valid_through: Option<String>,
    pub description_html: Option<String>,
}

/// Mergeable fields of a [`PartialJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Company,
    CompanyUrl,
    Location,
    EmploymentType,
    Salary,
    DatePosted,
    ValidThrough,
    DescriptionHtml,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::Title,
        Field::Company,
        Field::CompanyUrl,
        Field::Location,
        Field::EmploymentType,
        Field::Salary,
        Field::DatePosted,
        Field::ValidThrough,
        Field::DescriptionHtml,
    ];
}

impl PartialJob {
    pub fn get(&self, field: Field) -> Option<&String> {
        match field {
            Field::Title => self.title.as_ref(),
            Field::Company => self.company.as_ref(),
            Field::CompanyUrl => self.company_url.as_ref(),
            Field::Location => self.location.as_ref(),
            Field::EmploymentType => self.employment_type.as_ref(),
            Field::Salary => self.salary.as_ref(),
            Field::DatePosted => self.date_posted.as_ref(),
            Field::ValidThrough => self.valid_through.as_ref(),
            Field::DescriptionHtml => self.description_html.as_ref(),
        }
    }

    pub fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Title => &mut self.title,
            Field::Company => &mut self.company,
            Field::CompanyUrl => &mut self.company_url,
            Field::Location => &mut self.location,
            Field::EmploymentType => &mut self.employment_type,
            Field::Salary => &mut self.salary,
            Field::DatePosted => &mut self.date_posted,
            Field::ValidThrough => &mut self.valid_through,
            Field::DescriptionHtml => &mut self.description_html,
        }
    }

    /// Fields this source left empty.
    pub fn missing(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }
}

/// Raw salary as found in any source, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum SalaryInput {
    Numeric(f64),
    Structured {
        min: Option<f64>,
        max: Option<f64>,
        currency: Option<String>,
    },
    FreeText(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Api,
    Html,
}

/// Where the controller is in the page sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page_number: u32,
    pub source_mode: SourceMode,
}

impl PageCursor {
    pub fn api_start() -> Self {
        Self { page_number: 0, source_mode: SourceMode::Api }
    }

    pub fn advance(self) -> Self {
        Self { page_number: self.page_number + 1, ..self }
    }
}

/// Trimmed value, or `None` when nothing is left.
pub fn non_empty(value: impl AsRef<str>) -> Option<String> {
    let trimmed = value.as_ref().trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lists_only_empty_fields() {
        let partial = PartialJob {
            title: Some("Backend Engineer".to_string()),
            salary: Some("50,000 EUR".to_string()),
            ..Default::default()
        };
        let missing = partial.missing();
        assert_eq!(missing.len(), 7);
        assert!(!missing.contains(&Field::Title));
        assert!(!missing.contains(&Field::Salary));
        assert!(missing.contains(&Field::Location));
    }

    #[test]
    fn test_record_serializes_source_lowercase_and_nulls() {
        let record = JobRecord::stub("https://www.kununu.com/de/job/abc");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["source"], "kununu");
        assert!(value["title"].is_null());
        assert_eq!(value["url"], "https://www.kununu.com/de/job/abc");
    }

    #[test]
    fn test_non_empty_trims() {
        assert_eq!(non_empty("  Berlin "), Some("Berlin".to_string()));
        assert_eq!(non_empty("   "), None);
    }
}

//! The site's JSON search API, plus the matching HTML search URL.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::fetch::{build_headers, ProxyRotator, RequestKind, Transport};
use crate::html::SITE_ROOT;
use crate::jsonld::joined_text;
use crate::models::{non_empty, PartialJob, SearchCriteria};
use crate::normalize::normalize_salary_json;

pub const API_SEARCH_URL: &str = "https://www.kununu.com/api/v1/jobs/search";
pub const HTML_SEARCH_URL: &str = "https://www.kununu.com/de/jobs";
const API_PAGE_SIZE: u32 = 50;

/// Query parameters for one API page. `page_index` is zero-based; the API is one-based.
pub fn api_params(criteria: &SearchCriteria, page_index: u32) -> Vec<(String, String)> {
    let mut params = Vec::new();
    if !criteria.title.is_empty() {
        params.push(("q".to_string(), criteria.title.clone()));
    }
    if !criteria.location.is_empty() {
        params.push(("location".to_string(), criteria.location.clone()));
    }
    if criteria.home_office {
        params.push(("homeOffice".to_string(), "true".to_string()));
    }
    if !criteria.employment_type.is_empty() {
        params.push(("employmentType".to_string(), criteria.employment_type.clone()));
    }
    if !criteria.career_level.is_empty() {
        params.push(("careerLevel".to_string(), criteria.career_level.clone()));
    }
    params.push(("page".to_string(), (page_index + 1).to_string()));
    params.push(("limit".to_string(), API_PAGE_SIZE.to_string()));
    params
}

/// HTML listing URL applying the same filters as [`api_params`].
pub fn build_search_url(criteria: &SearchCriteria, page: u32) -> Url {
    let mut url = Url::parse(HTML_SEARCH_URL).expect("static search URL is valid");
    {
        let mut query = url.query_pairs_mut();
        if !criteria.title.is_empty() {
            query.append_pair("q", &criteria.title);
        }
        if !criteria.location.is_empty() {
            query.append_pair("l", &criteria.location);
        }
        if criteria.home_office {
            query.append_pair("w", "home-office");
        }
        if !criteria.employment_type.is_empty() {
            query.append_pair("m", &criteria.employment_type);
        }
        if !criteria.career_level.is_empty() {
            query.append_pair("t", &criteria.career_level);
        }
        if page > 1 {
            query.append_pair("page", &page.to_string());
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    url
}

/// One job from an API page, keyed by its detail URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiJob {
    pub url: String,
    pub data: PartialJob,
}

#[derive(Debug, Deserialize)]
struct ApiSearchResponse {
    jobs: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawApiJob {
    id: Option<Value>,
    uuid: Option<Value>,
    title: Option<Value>,
    job_title: Option<Value>,
    company: Option<Value>,
    company_name: Option<Value>,
    company_url: Option<Value>,
    location: Option<Value>,
    location_name: Option<Value>,
    employment_type: Option<Value>,
    salary: Option<Value>,
    salary_text: Option<Value>,
    published_at: Option<Value>,
    date_posted: Option<Value>,
    url: Option<Value>,
}

impl RawApiJob {
    fn into_api_job(self) -> Option<ApiJob> {
        let id = self.id.as_ref().or(self.uuid.as_ref()).and_then(joined_text);
        let url = match (text(&self.url), id) {
            (Some(url), _) => absolute(&url),
            (None, Some(id)) => format!("{}/de/job/{}", SITE_ROOT, id),
            (None, None) => return None,
        };

        let salary = self
            .salary
            .filter(|v| !v.is_null())
            .or(self.salary_text.filter(|v| !v.is_null()));

        let data = PartialJob {
            title: text(&self.title).or_else(|| text(&self.job_title)),
            company: nested_text(self.company.as_ref(), "name")
                .or_else(|| text(&self.company_name)),
            company_url: self
                .company
                .as_ref()
                .and_then(|c| c.get("url"))
                .and_then(Value::as_str)
                .and_then(non_empty)
                .or_else(|| text(&self.company_url)),
            location: nested_text(self.location.as_ref(), "name")
                .or_else(|| text(&self.location_name)),
            employment_type: self.employment_type.as_ref().and_then(joined_text),
            salary: salary.as_ref().and_then(normalize_salary_json),
            date_posted: text(&self.published_at).or_else(|| text(&self.date_posted)),
            valid_through: None,
            description_html: None,
        };

        Some(ApiJob { url, data })
    }
}

/// Scalar field as text, whatever JSON type the API used for it.
fn text(value: &Option<Value>) -> Option<String> {
    value.as_ref().and_then(joined_text)
}

/// `value.key` for objects, or the value itself when the API sent a bare string.
fn nested_text(value: Option<&Value>, key: &str) -> Option<String> {
    match value? {
        Value::String(s) => non_empty(s),
        other => other.get(key).and_then(Value::as_str).and_then(non_empty),
    }
}

fn absolute(href: &str) -> String {
    Url::parse(SITE_ROOT)
        .and_then(|root| root.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Jobs in an API response body. `None` when the body has no job list at all.
///
/// Entries that do not fit the expected shape, or carry neither URL nor id, are dropped.
pub fn parse_api_response(body: &Value) -> Option<Vec<ApiJob>> {
    let response: ApiSearchResponse = serde_json::from_value(body.clone()).ok()?;
    let jobs = response.jobs?;

    Some(
        jobs.into_iter()
            .filter_map(|raw| match serde_json::from_value::<RawApiJob>(raw) {
                Ok(job) => job.into_api_job(),
                Err(e) => {
                    debug!("Skipping API job with unexpected shape: {}", e);
                    None
                }
            })
            .collect(),
    )
}

/// Fetch one API page. Failures and empty pages both come back as `None`.
pub async fn fetch_api_page(
    transport: &dyn Transport,
    proxies: &ProxyRotator,
    criteria: &SearchCriteria,
    page_index: u32,
) -> Option<Vec<ApiJob>> {
    let params = api_params(criteria, page_index);
    let headers = build_headers(RequestKind::Api, rand::random());
    let proxy = proxies.next();

    match transport.fetch_json(API_SEARCH_URL, &params, &headers, proxy.as_ref()).await {
        Ok(body) => parse_api_response(&body).filter(|jobs| !jobs.is_empty()),
        Err(e) => {
            warn!("API fetch failed: {:#}. Falling back to HTML parsing.", e);
            None
        }
    }
}

//! Run configuration: the JSON input file, CLI overrides, and validation.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::crawler::CrawlSettings;
use crate::models::SearchCriteria;
use crate::sink::default_output_path;

pub const DEFAULT_RESULTS_WANTED: i64 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 50;
pub const DEFAULT_MAX_CONCURRENCY: usize = 12;
pub const MAX_CONCURRENCY_CEILING: usize = 50;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

const UNBOUNDED_WORDS: [&str; 3] = ["unlimited", "all", "max"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("results_wanted must be a number or one of unlimited/all/max, got {0}")]
    ResultsWanted(String),

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("input file is not a valid run configuration: {0}")]
    Input(#[from] serde_json::Error),
}

/// Run input as supplied in a JSON file. Field names follow the caller contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunInput {
    #[serde(rename = "jobTitle")]
    pub job_title: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "homeOffice")]
    pub home_office: Option<bool>,
    #[serde(rename = "employmentType")]
    pub employment_type: Option<String>,
    #[serde(rename = "careerLevel")]
    pub career_level: Option<String>,
    /// Number, unbounded word, or `null` (unbounded).
    pub results_wanted: Value,
    pub max_pages: Option<i64>,
    #[serde(rename = "collectDetails")]
    pub collect_details: Option<bool>,
    #[serde(rename = "maxConcurrency")]
    pub max_concurrency: Option<i64>,
    #[serde(rename = "startUrl")]
    pub start_url: Option<String>,
    #[serde(rename = "startUrls")]
    pub start_urls: Option<Vec<StartUrl>>,
    pub url: Option<String>,
    #[serde(rename = "proxyConfiguration")]
    pub proxy_configuration: Option<ProxyConfiguration>,
}

impl Default for RunInput {
    fn default() -> Self {
        Self {
            job_title: None,
            location: None,
            home_office: None,
            employment_type: None,
            career_level: None,
            results_wanted: Value::from(DEFAULT_RESULTS_WANTED),
            max_pages: None,
            collect_details: None,
            max_concurrency: None,
            start_url: None,
            start_urls: None,
            url: None,
            proxy_configuration: None,
        }
    }
}

/// `"https://..."` or `{ "url": "https://..." }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StartUrl {
    Plain(String),
    Object { url: String },
}

impl StartUrl {
    fn as_str(&self) -> &str {
        match self {
            StartUrl::Plain(url) | StartUrl::Object { url } => url,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfiguration {
    #[serde(rename = "proxyUrls", default)]
    pub proxy_urls: Vec<String>,
}

/// Command-line values that take precedence over the input file.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ScrapeArgs {
    /// JSON input file (jobTitle, location, results_wanted, startUrls, ...)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Job title or keywords
    #[arg(short = 't', long)]
    pub job_title: Option<String>,

    /// City or region
    #[arg(short, long)]
    pub location: Option<String>,

    /// Only remote-friendly jobs
    #[arg(long)]
    pub home_office: bool,

    #[arg(long)]
    pub employment_type: Option<String>,

    #[arg(long)]
    pub career_level: Option<String>,

    /// Number of jobs to save, or "unlimited"
    #[arg(short = 'n', long)]
    pub results_wanted: Option<String>,

    #[arg(long)]
    pub max_pages: Option<i64>,

    /// Save listing URLs only, without fetching detail pages
    #[arg(long)]
    pub no_details: bool,

    #[arg(long)]
    pub max_concurrency: Option<i64>,

    /// Listing page to crawl instead of searching (repeatable)
    #[arg(long = "start-url")]
    pub start_urls: Vec<String>,

    /// Proxy to rotate through (repeatable)
    #[arg(long = "proxy-url")]
    pub proxy_urls: Vec<String>,

    /// Output file, or "-" for stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Per-request timeout
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Retries per request after the first failure
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub crawl: CrawlSettings,
    pub proxy_urls: Vec<String>,
    pub output: OutputTarget,
    pub timeout: Duration,
    /// Transport-level retries per request.
    pub max_retries: u32,
}

impl RunInput {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid input file: {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Overlay values given on the command line.
    pub fn apply(&mut self, args: &ScrapeArgs) {
        if let Some(title) = &args.job_title {
            self.job_title = Some(title.clone());
        }
        if let Some(location) = &args.location {
            self.location = Some(location.clone());
        }
        if args.home_office {
            self.home_office = Some(true);
        }
        if let Some(kind) = &args.employment_type {
            self.employment_type = Some(kind.clone());
        }
        if let Some(level) = &args.career_level {
            self.career_level = Some(level.clone());
        }
        if let Some(wanted) = &args.results_wanted {
            self.results_wanted = match wanted.trim().parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(wanted.clone()),
            };
        }
        if args.max_pages.is_some() {
            self.max_pages = args.max_pages;
        }
        if args.no_details {
            self.collect_details = Some(false);
        }
        if args.max_concurrency.is_some() {
            self.max_concurrency = args.max_concurrency;
        }
        if !args.start_urls.is_empty() {
            self.start_urls = Some(args.start_urls.iter().cloned().map(StartUrl::Plain).collect());
        }
        if !args.proxy_urls.is_empty() {
            self.proxy_configuration = Some(ProxyConfiguration { proxy_urls: args.proxy_urls.clone() });
        }
    }

    pub fn criteria(&self) -> SearchCriteria {
        let text = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or_default().to_string();
        SearchCriteria {
            title: text(&self.job_title),
            location: text(&self.location),
            home_office: self.home_office.unwrap_or(false),
            employment_type: text(&self.employment_type),
            career_level: text(&self.career_level),
        }
    }

    /// `None` means unbounded.
    pub fn target(&self) -> Result<Option<usize>, ConfigError> {
        match &self.results_wanted {
            Value::Null => Ok(None),
            Value::Number(n) => {
                let wanted = n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                    .ok_or_else(|| ConfigError::ResultsWanted(n.to_string()))?;
                Ok(Some(wanted.max(1) as usize))
            }
            Value::String(s) => {
                let trimmed = s.trim();
                if UNBOUNDED_WORDS.iter().any(|w| trimmed.eq_ignore_ascii_case(w)) {
                    return Ok(None);
                }
                trimmed
                    .parse::<i64>()
                    .map(|n| Some(n.max(1) as usize))
                    .map_err(|_| ConfigError::ResultsWanted(s.clone()))
            }
            other => Err(ConfigError::ResultsWanted(other.to_string())),
        }
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
            .map(|n| n.clamp(1, i64::from(u32::MAX)) as u32)
            .unwrap_or(DEFAULT_MAX_PAGES)
    }

    pub fn max_concurrency(&self) -> usize {
        match self.max_concurrency {
            Some(n) if n > 0 => (n as usize).min(MAX_CONCURRENCY_CEILING),
            _ => DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// `startUrls` when non-empty, else `startUrl`, else `url`.
    pub fn start_urls(&self) -> Result<Vec<Url>, ConfigError> {
        let listed: Vec<&str> = self
            .start_urls
            .iter()
            .flatten()
            .map(StartUrl::as_str)
            .filter(|u| !u.trim().is_empty())
            .collect();

        let chosen = if !listed.is_empty() {
            listed
        } else {
            self.start_url
                .as_deref()
                .or(self.url.as_deref())
                .filter(|u| !u.trim().is_empty())
                .into_iter()
                .collect()
        };

        chosen.into_iter().map(parse_http_url).collect()
    }

    pub fn proxy_urls(&self) -> Result<Vec<String>, ConfigError> {
        self.proxy_configuration
            .iter()
            .flat_map(|p| p.proxy_urls.iter())
            .map(|raw| parse_http_url(raw).map(|_| raw.trim().to_string()))
            .collect()
    }

    pub fn resolve(&self, args: &ScrapeArgs) -> Result<RunConfig, ConfigError> {
        let crawl = CrawlSettings {
            criteria: self.criteria(),
            target: self.target()?,
            max_pages: self.max_pages(),
            collect_details: self.collect_details.unwrap_or(true),
            max_concurrency: self.max_concurrency(),
            start_urls: self.start_urls()?,
        };

        let output = match &args.output {
            Some(path) if path.as_os_str() == "-" => OutputTarget::Stdout,
            Some(path) => OutputTarget::File(path.clone()),
            None => OutputTarget::File(default_output_path()),
        };

        Ok(RunConfig {
            crawl,
            proxy_urls: self.proxy_urls()?,
            output,
            timeout: Duration::from_secs(args.timeout_secs.max(1)),
            max_retries: args.max_retries,
        })
    }
}

fn parse_http_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl { url: raw.to_string(), reason };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {}", other))),
    }
}

/// Read the optional input file, apply CLI overrides, and validate.
pub fn load(args: &ScrapeArgs) -> Result<RunConfig> {
    let mut input = match &args.input {
        Some(path) => RunInput::from_file(path)?,
        None => RunInput::default(),
    };
    input.apply(args);
    Ok(input.resolve(args)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ScrapeArgs {
        ScrapeArgs {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = RunInput::default().resolve(&args()).unwrap();
        assert_eq!(config.crawl.target, Some(100));
        assert_eq!(config.crawl.max_pages, 50);
        assert_eq!(config.crawl.max_concurrency, 12);
        assert!(config.crawl.collect_details);
        assert!(config.crawl.start_urls.is_empty());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 2);
        assert!(matches!(config.output, OutputTarget::File(ref p) if p.ends_with("jobs.jsonl")));
    }

    #[test]
    fn test_parses_caller_field_names() {
        let input = RunInput::from_json(
            r#"{
                "jobTitle": " Data Scientist ",
                "location": "München",
                "homeOffice": true,
                "results_wanted": 0,
                "max_pages": -3,
                "collectDetails": false,
                "maxConcurrency": 500,
                "startUrls": ["https://www.kununu.com/de/jobs?q=a", { "url": "https://www.kununu.com/de/jobs?q=b" }],
                "proxyConfiguration": { "useApifyProxy": false, "proxyUrls": ["http://user:pw@proxy.example:8000"] }
            }"#,
        )
        .unwrap();
        let config = input.resolve(&args()).unwrap();

        assert_eq!(config.crawl.criteria.title, "Data Scientist");
        assert!(config.crawl.criteria.home_office);
        assert_eq!(config.crawl.target, Some(1));
        assert_eq!(config.crawl.max_pages, 1);
        assert!(!config.crawl.collect_details);
        assert_eq!(config.crawl.max_concurrency, 50);
        assert_eq!(config.crawl.start_urls.len(), 2);
        assert_eq!(config.proxy_urls, vec!["http://user:pw@proxy.example:8000"]);
    }

    #[test]
    fn test_results_wanted_unbounded_forms() {
        for raw in [r#"{"results_wanted": null}"#, r#"{"results_wanted": "Unlimited"}"#, r#"{"results_wanted": "all"}"#] {
            assert_eq!(RunInput::from_json(raw).unwrap().target().unwrap(), None, "{}", raw);
        }
        assert_eq!(RunInput::from_json(r#"{"results_wanted": "25"}"#).unwrap().target().unwrap(), Some(25));
    }

    #[test]
    fn test_results_wanted_garbage_is_fatal() {
        let input = RunInput::from_json(r#"{"results_wanted": "lots"}"#).unwrap();
        assert!(matches!(input.resolve(&args()), Err(ConfigError::ResultsWanted(_))));
    }

    #[test]
    fn test_start_url_fallbacks_and_validation() {
        let single = RunInput::from_json(r#"{"url": "https://www.kununu.com/de/jobs?page=4"}"#).unwrap();
        assert_eq!(single.start_urls().unwrap()[0].as_str(), "https://www.kununu.com/de/jobs?page=4");

        let empty_list = RunInput::from_json(r#"{"startUrls": [], "startUrl": "https://www.kununu.com/de/jobs"}"#).unwrap();
        assert_eq!(empty_list.start_urls().unwrap().len(), 1);

        let bad = RunInput::from_json(r#"{"startUrls": ["ftp://example.com/jobs"]}"#).unwrap();
        assert!(matches!(bad.start_urls(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_cli_overrides_file_values() {
        let mut input = RunInput::from_json(r#"{"jobTitle": "Koch", "maxConcurrency": 4, "results_wanted": 10}"#).unwrap();
        let mut cli = args();
        cli.job_title = Some("Bäcker".to_string());
        cli.results_wanted = Some("unlimited".to_string());
        cli.no_details = true;
        cli.output = Some(PathBuf::from("-"));
        input.apply(&cli);

        let config = input.resolve(&cli).unwrap();
        assert_eq!(config.crawl.criteria.title, "Bäcker");
        assert_eq!(config.crawl.target, None);
        assert_eq!(config.crawl.max_concurrency, 4);
        assert!(!config.crawl.collect_details);
        assert_eq!(config.output, OutputTarget::Stdout);
    }

    #[test]
    fn test_malformed_input_is_a_config_error() {
        assert!(matches!(RunInput::from_json("{ not json"), Err(ConfigError::Input(_))));
    }
}

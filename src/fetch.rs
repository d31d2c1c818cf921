//! HTTP transport: header generation, proxy rotation and the reqwest-backed fetcher.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const ACCEPT_LANGUAGE: &str = "de-DE,de;q=0.9,en-US;q=0.8,en;q=0.7";
const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json, text/plain, */*";

/// Longest `retry-after` we are willing to sit out.
const MAX_RETRY_AFTER_SECS: u64 = 10;
/// First back-off after a 5xx or network error; doubles per retry.
const RETRY_BASE_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Api,
    Page,
}

pub type HeaderSet = Vec<(String, String)>;

/// Browser-like headers for one request. `identity` picks the user agent.
pub fn build_headers(kind: RequestKind, identity: usize) -> HeaderSet {
    let accept = match kind {
        RequestKind::Api => ACCEPT_JSON,
        RequestKind::Page => ACCEPT_HTML,
    };
    vec![
        ("user-agent".to_string(), USER_AGENTS[identity % USER_AGENTS.len()].to_string()),
        ("accept".to_string(), accept.to_string()),
        ("accept-language".to_string(), ACCEPT_LANGUAGE.to_string()),
        ("cache-control".to_string(), "no-cache".to_string()),
        ("pragma".to_string(), "no-cache".to_string()),
    ]
}

/// Egress identity chosen for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHandle {
    pub index: usize,
    pub url: String,
}

/// Round-robin over configured proxy URLs.
#[derive(Debug, Default)]
pub struct ProxyRotator {
    urls: Vec<String>,
    cursor: AtomicUsize,
}

impl ProxyRotator {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls, cursor: AtomicUsize::new(0) }
    }

    pub fn next(&self) -> Option<ProxyHandle> {
        if self.urls.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.urls.len();
        Some(ProxyHandle { index, url: self.urls[index].clone() })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}

/// The fetch operations the crawler needs from its transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Body of an HTML page.
    async fn fetch_document(
        &self,
        url: &str,
        headers: &HeaderSet,
        proxy: Option<&ProxyHandle>,
    ) -> Result<String>;

    /// Parsed JSON body of a GET with query parameters.
    async fn fetch_json(
        &self,
        url: &str,
        params: &[(String, String)],
        headers: &HeaderSet,
        proxy: Option<&ProxyHandle>,
    ) -> Result<Value>;
}

/// reqwest transport with one client per proxy.
///
/// Network errors, 5xx and 429 responses are retried up to `max_retries` times.
pub struct HttpTransport {
    direct: Client,
    proxied: Vec<Client>,
    timeout: Duration,
    max_retries: u32,
}

impl HttpTransport {
    pub fn new(timeout: Duration, max_retries: u32, proxies: &ProxyRotator) -> Result<Self> {
        let direct = Self::builder(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let proxied = proxies
            .urls()
            .iter()
            .map(|proxy_url| {
                let proxy = reqwest::Proxy::all(proxy_url.as_str())
                    .with_context(|| format!("Invalid proxy URL: {}", proxy_url))?;
                Self::builder(timeout)
                    .proxy(proxy)
                    .build()
                    .context("Failed to build proxied HTTP client")
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { direct, proxied, timeout, max_retries })
    }

    fn builder(timeout: Duration) -> reqwest::ClientBuilder {
        Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
    }

    fn client_for(&self, proxy: Option<&ProxyHandle>) -> &Client {
        proxy
            .and_then(|p| self.proxied.get(p.index))
            .unwrap_or(&self.direct)
    }

    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        headers: &HeaderSet,
        proxy: Option<&ProxyHandle>,
    ) -> Result<reqwest::Response> {
        let mut retries = 0u32;

        loop {
            let mut request = self.client_for(proxy).get(url).timeout(self.timeout);
            if !params.is_empty() {
                request = request.query(params);
            }
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if retries < self.max_retries => {
                    retries += 1;
                    let delay = backoff(retries);
                    debug!("Request to {} failed ({}), retry {} in {:?}", url, e, retries, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Request to {} failed", url));
                }
            };

            let status = response.status().as_u16();
            if status >= 500 && retries < self.max_retries {
                retries += 1;
                let delay = backoff(retries);
                debug!("HTTP {} from {}, retry {} in {:?}", status, url, retries, delay);
                tokio::time::sleep(delay).await;
                continue;
            }
            if status == 429 && retries < self.max_retries {
                retries += 1;
                let wait = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(2)
                    .min(MAX_RETRY_AFTER_SECS);
                debug!("Rate limited on {}, retry {} in {}s", url, retries, wait);
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            if !response.status().is_success() {
                return Err(FetchError::Status { url: url.to_string(), status }.into());
            }
            return Ok(response);
        }
    }
}

fn backoff(retry: u32) -> Duration {
    Duration::from_millis(RETRY_BASE_MS * 2u64.pow(retry.saturating_sub(1)))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_document(
        &self,
        url: &str,
        headers: &HeaderSet,
        proxy: Option<&ProxyHandle>,
    ) -> Result<String> {
        let response = self.get(url, &[], headers, proxy).await?;
        response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))
    }

    async fn fetch_json(
        &self,
        url: &str,
        params: &[(String, String)],
        headers: &HeaderSet,
        proxy: Option<&ProxyHandle>,
    ) -> Result<Value> {
        let response = self.get(url, params, headers, proxy).await?;
        response
            .json::<Value>()
            .await
            .with_context(|| format!("Invalid JSON from {}", url))
    }
}

//! Acquisition controller: API paging first, then the HTML listing/detail crawl.
//!
//! API pages are fetched one after another on the calling task. Listing and
//! detail fetches share one request queue and run on a bounded `JoinSet`.
//! Every handler reports back to the dispatcher, which is the only place that
//! touches the queue and the run statistics. Retrying failed fetches is the
//! transport's job; a failure that reaches the dispatcher is final.

use anyhow::{Context, Result};
use scraper::Html;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::api::{build_search_url, fetch_api_page};
use crate::assemble::{assemble, JobLayers};
use crate::fetch::{build_headers, ProxyRotator, RequestKind, Transport};
use crate::html::{extract_fallback, job_links};
use crate::jsonld::extract_job_posting;
use crate::models::{JobRecord, PageCursor, PartialJob, SearchCriteria, SourceMode};
use crate::pagination::{page_param, resolve_next_page};
use crate::queue::{CrawlRequest, RequestLabel, RequestQueue};
use crate::sink::RecordSink;
use crate::state::{ClaimMode, SharedState};

/// Everything the crawler needs to know about one run.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub criteria: SearchCriteria,
    /// `None` means no limit.
    pub target: Option<usize>,
    pub max_pages: u32,
    pub collect_details: bool,
    pub max_concurrency: usize,
    /// Explicit listing pages. When present the API is not queried.
    pub start_urls: Vec<Url>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub saved: usize,
    pub api_pages: usize,
    pub listing_pages: usize,
    pub details_fetched: usize,
    pub details_failed: usize,
    pub duplicates_skipped: usize,
    pub skipped_after_target: usize,
}

/// What a finished task reports to the dispatcher.
#[derive(Debug)]
enum Handled {
    Listing {
        details: Vec<CrawlRequest>,
        next: Option<CrawlRequest>,
    },
    DetailSaved,
    DetailSkipped { fetched: bool },
}

pub struct Crawler {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn RecordSink>,
    proxies: Arc<ProxyRotator>,
    settings: CrawlSettings,
}

impl Crawler {
    pub fn new(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn RecordSink>,
        proxies: Arc<ProxyRotator>,
        settings: CrawlSettings,
    ) -> Self {
        Self { transport, sink, proxies, settings }
    }

    pub async fn run(&self) -> Result<RunStats> {
        let target = self.settings.target.unwrap_or(usize::MAX);
        let state = SharedState::new(target, self.settings.max_pages);
        let mut stats = RunStats::default();
        let mut queue = RequestQueue::default();

        if self.settings.start_urls.is_empty() {
            self.api_phase(&state, &mut queue, &mut stats).await?;
        } else {
            info!("{} start URL(s) given, skipping the API", self.settings.start_urls.len());
        }

        // Listing seeds wait until capacity frees up if the API filled it.
        let mut parked: Vec<CrawlRequest> = Vec::new();
        if !state.target_reached() {
            let seeds = self.listing_seeds();
            if state.has_capacity() {
                for seed in seeds {
                    queue.push(seed);
                }
            } else {
                parked.extend(seeds);
            }
        }

        self.drain(&state, &mut queue, &mut parked, &mut stats).await;

        stats.saved = state.saved();
        stats.duplicates_skipped = state.duplicates_skipped();
        Ok(stats)
    }

    async fn api_phase(
        &self,
        state: &SharedState,
        queue: &mut RequestQueue,
        stats: &mut RunStats,
    ) -> Result<()> {
        let mut cursor = PageCursor::api_start();

        while cursor.page_number < self.settings.max_pages && state.has_capacity() {
            let Some(jobs) = fetch_api_page(
                self.transport.as_ref(),
                &self.proxies,
                &self.settings.criteria,
                cursor.page_number,
            )
            .await
            else {
                info!(
                    "API page {} returned no jobs, switching to {:?} listing",
                    cursor.page_number + 1,
                    SourceMode::Html
                );
                break;
            };
            stats.api_pages += 1;

            let mut by_url: HashMap<String, PartialJob> = HashMap::new();
            let mut order = Vec::with_capacity(jobs.len());
            for job in jobs {
                if !by_url.contains_key(&job.url) {
                    order.push(job.url.clone());
                    by_url.insert(job.url, job.data);
                }
            }

            let mode = if self.settings.collect_details {
                ClaimMode::ScheduleDetail
            } else {
                ClaimMode::EmitNow
            };
            let saved_before = state.saved();
            let claim = state.claim(order, mode);
            debug!(
                "API page {}: {} new, {} duplicates",
                cursor.page_number + 1,
                claim.accepted.len(),
                claim.duplicates
            );

            for (offset, url) in claim.accepted.into_iter().enumerate() {
                let data = by_url.remove(&url);
                if self.settings.collect_details {
                    queue.push(CrawlRequest::detail(url, data));
                } else {
                    let layers = JobLayers { api: data, ..Default::default() };
                    let record = assemble(&url, &layers);
                    log_saved(saved_before + offset + 1, state.target(), &record);
                    emit(self.sink.as_ref(), &record).await;
                }
            }

            cursor = cursor.advance();
        }

        Ok(())
    }

    fn listing_seeds(&self) -> Vec<CrawlRequest> {
        if self.settings.start_urls.is_empty() {
            let url = build_search_url(&self.settings.criteria, 1);
            return vec![CrawlRequest::list(url.to_string(), 1)];
        }
        self.settings
            .start_urls
            .iter()
            .map(|url| CrawlRequest::list(url.to_string(), page_param(url).unwrap_or(1)))
            .collect()
    }

    fn worker(&self, state: &SharedState) -> Worker {
        Worker {
            transport: Arc::clone(&self.transport),
            sink: Arc::clone(&self.sink),
            proxies: Arc::clone(&self.proxies),
            state: state.clone(),
            collect_details: self.settings.collect_details,
        }
    }

    async fn drain(
        &self,
        state: &SharedState,
        queue: &mut RequestQueue,
        parked: &mut Vec<CrawlRequest>,
        stats: &mut RunStats,
    ) {
        let limit = self.settings.max_concurrency.max(1);
        let mut tasks: JoinSet<Result<Handled>> = JoinSet::new();
        let mut running: HashMap<task::Id, CrawlRequest> = HashMap::new();

        loop {
            while tasks.len() < limit {
                let Some(request) = queue.pop() else { break };
                if state.target_reached() {
                    drop_after_target(&request, state, stats);
                    continue;
                }
                let worker = self.worker(state);
                let task_request = request.clone();
                let handle = tasks.spawn(async move { worker.handle(&task_request).await });
                running.insert(handle.id(), request);
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                if state.has_capacity() && !parked.is_empty() {
                    debug!("Resuming {} parked listing page(s)", parked.len());
                    for request in parked.drain(..) {
                        queue.push(request);
                    }
                    if !queue.is_empty() {
                        continue;
                    }
                }
                break;
            };

            let (request, outcome) = match joined {
                Ok((id, outcome)) => match running.remove(&id) {
                    Some(request) => (request, outcome),
                    None => continue,
                },
                Err(e) => {
                    error!("Crawler task panicked: {}", e);
                    if let Some(request) = running.remove(&e.id()) {
                        abandon(&request, state, stats);
                    }
                    continue;
                }
            };

            match outcome {
                Ok(Handled::Listing { details, next }) => {
                    stats.listing_pages += 1;
                    for detail in details {
                        queue.push(detail);
                    }
                    if let Some(next) = next {
                        if state.has_capacity() {
                            queue.push(next);
                        } else if !state.target_reached() {
                            parked.push(next);
                        }
                    }
                }
                Ok(Handled::DetailSaved) => stats.details_fetched += 1,
                Ok(Handled::DetailSkipped { fetched }) => {
                    stats.skipped_after_target += 1;
                    if fetched {
                        stats.details_fetched += 1;
                    }
                }
                Err(e) => {
                    warn!("Giving up on {}: {:#}", request.url, e);
                    abandon(&request, state, stats);
                }
            }
        }

        info!(
            "Crawl finished: {} saved, {} in flight, {} queued",
            state.saved(),
            state.in_flight(),
            queue.pending_count()
        );
    }
}

/// A request that failed for good: details give their slot back, listings end their branch.
fn abandon(request: &CrawlRequest, state: &SharedState, stats: &mut RunStats) {
    match request.label {
        RequestLabel::Detail { .. } => {
            state.release_detail();
            stats.details_failed += 1;
        }
        RequestLabel::List { page_no } => {
            debug!("Stopping pagination after listing page {}", page_no);
        }
    }
}

fn drop_after_target(request: &CrawlRequest, state: &SharedState, stats: &mut RunStats) {
    match request.label {
        RequestLabel::Detail { .. } => {
            state.release_detail();
            stats.skipped_after_target += 1;
        }
        RequestLabel::List { page_no } => {
            debug!("Target reached, not fetching listing page {}", page_no);
        }
    }
}

/// Per-task handle on the shared collaborators.
struct Worker {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn RecordSink>,
    proxies: Arc<ProxyRotator>,
    state: SharedState,
    collect_details: bool,
}

impl Worker {
    async fn handle(&self, request: &CrawlRequest) -> Result<Handled> {
        match &request.label {
            RequestLabel::List { page_no } => self.listing(&request.url, *page_no).await,
            RequestLabel::Detail { api_data } => {
                self.detail(&request.url, api_data.as_deref().cloned()).await
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let headers = build_headers(RequestKind::Page, rand::random());
        let proxy = self.proxies.next();
        self.transport.fetch_document(url, &headers, proxy.as_ref()).await
    }

    async fn listing(&self, url: &str, page_no: u32) -> Result<Handled> {
        let body = self.fetch_page(url).await?;
        let current = Url::parse(url).with_context(|| format!("Invalid listing URL: {}", url))?;
        let (links, next_url) = parse_listing(&body, &current, page_no, self.state.max_pages());

        let found = links.len();
        let mode = if self.collect_details {
            ClaimMode::ScheduleDetail
        } else {
            ClaimMode::EmitNow
        };
        let claim = self.state.claim(links, mode);
        info!(
            "Listing page {}: {} job links, {} new, {} duplicates",
            page_no,
            found,
            claim.accepted.len(),
            claim.duplicates
        );

        let mut details = Vec::new();
        for job_url in claim.accepted {
            if self.collect_details {
                details.push(CrawlRequest::detail(job_url, None));
            } else {
                emit(self.sink.as_ref(), &JobRecord::stub(job_url)).await;
            }
        }

        let next = next_url
            .filter(|_| !self.state.target_reached())
            .map(|next| CrawlRequest::list(next.to_string(), page_no + 1));
        if next.is_none() {
            debug!("No further listing pages after page {}", page_no);
        }

        Ok(Handled::Listing { details, next })
    }

    async fn detail(&self, url: &str, api_data: Option<PartialJob>) -> Result<Handled> {
        if self.state.target_reached() {
            self.state.release_detail();
            return Ok(Handled::DetailSkipped { fetched: false });
        }

        let body = self.fetch_page(url).await?;
        let record = extract_record(url, &body, api_data);

        match self.state.finish_detail() {
            Some(saved) => {
                log_saved(saved, self.state.target(), &record);
                emit(self.sink.as_ref(), &record).await;
                Ok(Handled::DetailSaved)
            }
            None => {
                debug!("Target already reached, discarding {}", url);
                Ok(Handled::DetailSkipped { fetched: true })
            }
        }
    }
}

fn parse_listing(body: &str, current: &Url, page_no: u32, max_pages: u32) -> (Vec<String>, Option<Url>) {
    let document = Html::parse_document(body);
    let links = job_links(&document);
    let next = resolve_next_page(&document, current, page_no, max_pages);
    (links, next)
}

/// Build the record for one detail page, layered over whatever the API already supplied.
pub fn extract_record(url: &str, body: &str, api: Option<PartialJob>) -> JobRecord {
    let document = Html::parse_document(body);
    let mut layers = JobLayers {
        api,
        structured: extract_job_posting(&document),
        html: None,
    };
    let missing = layers.merged().missing();
    layers.html = Some(extract_fallback(&document, &missing));
    assemble(url, &layers)
}

async fn emit(sink: &dyn RecordSink, record: &JobRecord) {
    if let Err(e) = sink.emit(record).await {
        error!("Failed to write {}: {:#}", record.url, e);
    }
}

fn log_saved(saved: usize, target: usize, record: &JobRecord) {
    let title = record.title.as_deref().unwrap_or("(untitled)");
    if target == usize::MAX {
        info!("Saved job {}: {}", saved, title);
    } else {
        info!("Saved job {}/{}: {}", saved, target, title);
    }
}

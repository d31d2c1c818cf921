use std::collections::{HashSet, VecDeque};

use crate::models::PartialJob;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestLabel {
    /// A listing page and its page number.
    List { page_no: u32 },
    /// A job detail page, with whatever the API already told us about it.
    Detail { api_data: Option<Box<PartialJob>> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRequest {
    pub url: String,
    pub label: RequestLabel,
}

impl CrawlRequest {
    pub fn list(url: impl Into<String>, page_no: u32) -> Self {
        Self { url: url.into(), label: RequestLabel::List { page_no } }
    }

    pub fn detail(url: impl Into<String>, api_data: Option<PartialJob>) -> Self {
        Self {
            url: url.into(),
            label: RequestLabel::Detail { api_data: api_data.map(Box::new) },
        }
    }

    pub fn is_detail(&self) -> bool {
        matches!(self.label, RequestLabel::Detail { .. })
    }
}

/// FIFO of pending fetches.
///
/// Listing URLs are unique for the whole run, so a pagination loop cannot
/// revisit a page. Detail URLs are already deduplicated by the acquisition state.
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: VecDeque<CrawlRequest>,
    listed: HashSet<String>,
}

impl RequestQueue {
    /// Returns `false` when a listing URL was queued before.
    pub fn push(&mut self, request: CrawlRequest) -> bool {
        if !request.is_detail() && !self.listed.insert(request.url.clone()) {
            return false;
        }
        self.pending.push_back(request);
        true
    }

    pub fn pop(&mut self) -> Option<CrawlRequest> {
        self.pending.pop_front()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

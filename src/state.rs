//! Run-wide dedup set and counters, shared by every crawler task.
//!
//! All mutation goes through [`SharedState`], which holds the lock for the
//! whole check-then-act of each operation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
pub struct AcquisitionState {
    pub saved_count: usize,
    pub seen_urls: HashSet<String>,
    pub in_flight_details: usize,
    pub target_count: usize,
    pub max_pages: u32,
    pub duplicates_skipped: usize,
}

impl AcquisitionState {
    pub fn new(target_count: usize, max_pages: u32) -> Self {
        Self {
            saved_count: 0,
            seen_urls: HashSet::new(),
            in_flight_details: 0,
            target_count,
            max_pages,
            duplicates_skipped: 0,
        }
    }

    /// Slots left once saved and scheduled jobs are counted.
    pub fn remaining_capacity(&self) -> usize {
        self.target_count
            .saturating_sub(self.saved_count)
            .saturating_sub(self.in_flight_details)
    }

    pub fn target_reached(&self) -> bool {
        self.saved_count >= self.target_count
    }
}

/// How accepted URLs are accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimMode {
    /// A detail fetch will follow; the job counts as in flight.
    ScheduleDetail,
    /// The job is emitted right away; it counts as saved.
    EmitNow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claim {
    pub accepted: Vec<String>,
    pub duplicates: usize,
}

#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<AcquisitionState>>,
}

impl SharedState {
    pub fn new(target_count: usize, max_pages: u32) -> Self {
        Self { inner: Arc::new(Mutex::new(AcquisitionState::new(target_count, max_pages))) }
    }

    fn lock(&self) -> MutexGuard<'_, AcquisitionState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Accept unseen URLs in order while capacity remains.
    ///
    /// Accepted URLs enter the dedup set and the matching counter in one step.
    /// Unseen URLs past the capacity are left out of the set so a later page can still offer them.
    pub fn claim<I, S>(&self, urls: I, mode: ClaimMode) -> Claim
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.lock();
        let mut claim = Claim::default();

        for url in urls {
            let url = url.into();
            if state.seen_urls.contains(&url) {
                claim.duplicates += 1;
                continue;
            }
            if state.remaining_capacity() == 0 {
                break;
            }
            state.seen_urls.insert(url.clone());
            match mode {
                ClaimMode::ScheduleDetail => state.in_flight_details += 1,
                ClaimMode::EmitNow => state.saved_count += 1,
            }
            claim.accepted.push(url);
        }

        state.duplicates_skipped += claim.duplicates;
        claim
    }

    /// Close out one in-flight detail and, if the target still has room, count it as saved.
    ///
    /// Returns the new saved count when the record should be emitted.
    pub fn finish_detail(&self) -> Option<usize> {
        let mut state = self.lock();
        state.in_flight_details = state.in_flight_details.saturating_sub(1);
        if state.target_reached() {
            return None;
        }
        state.saved_count += 1;
        Some(state.saved_count)
    }

    /// Drop one in-flight detail without saving it (skipped or abandoned).
    pub fn release_detail(&self) {
        let mut state = self.lock();
        state.in_flight_details = state.in_flight_details.saturating_sub(1);
    }

    pub fn target_reached(&self) -> bool {
        self.lock().target_reached()
    }

    pub fn has_capacity(&self) -> bool {
        self.lock().remaining_capacity() > 0
    }

    pub fn saved(&self) -> usize {
        self.lock().saved_count
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight_details
    }

    pub fn target(&self) -> usize {
        self.lock().target_count
    }

    pub fn max_pages(&self) -> u32 {
        self.lock().max_pages
    }

    pub fn duplicates_skipped(&self) -> usize {
        self.lock().duplicates_skipped
    }

    #[cfg(test)]
    pub fn seen_count(&self) -> usize {
        self.lock().seen_urls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_respects_capacity_and_dedup() {
        let state = SharedState::new(3, 10);
        let first = state.claim(["a", "b"], ClaimMode::ScheduleDetail);
        assert_eq!(first.accepted, vec!["a", "b"]);
        assert_eq!(state.in_flight(), 2);

        let second = state.claim(["b", "c", "d"], ClaimMode::ScheduleDetail);
        assert_eq!(second.accepted, vec!["c"]);
        assert_eq!(second.duplicates, 1);
        assert!(!state.has_capacity());
        // "d" was past capacity and never entered the dedup set
        assert_eq!(state.seen_count(), 3);
    }

    #[test]
    fn test_emit_now_counts_as_saved() {
        let state = SharedState::new(2, 10);
        let claim = state.claim(["a", "b", "c"], ClaimMode::EmitNow);
        assert_eq!(claim.accepted.len(), 2);
        assert_eq!(state.saved(), 2);
        assert!(state.target_reached());
    }

    #[test]
    fn test_finish_detail_stops_at_target() {
        let state = SharedState::new(1, 10);
        state.claim(["a"], ClaimMode::ScheduleDetail);
        assert_eq!(state.finish_detail(), Some(1));
        // a late completion is counted down but not saved
        assert_eq!(state.finish_detail(), None);
        assert_eq!(state.saved(), 1);
        assert_eq!(state.in_flight(), 0);
    }

    #[test]
    fn test_release_detail_frees_capacity() {
        let state = SharedState::new(1, 10);
        state.claim(["a"], ClaimMode::ScheduleDetail);
        assert!(!state.has_capacity());
        state.release_detail();
        assert!(state.has_capacity());
        // the released URL stays seen
        assert!(state.claim(["a"], ClaimMode::ScheduleDetail).accepted.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_double_schedule() {
        let state = SharedState::new(1000, 10);
        let urls: Vec<String> = (0..100).map(|i| format!("https://www.kununu.com/de/job/{}", i)).collect();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let state = state.clone();
            let urls = urls.clone();
            tasks.spawn(async move { state.claim(urls, ClaimMode::ScheduleDetail).accepted.len() });
        }

        let mut total = 0;
        while let Some(accepted) = tasks.join_next().await {
            total += accepted.unwrap();
        }
        assert_eq!(total, 100);
        assert_eq!(state.in_flight(), 100);
        assert_eq!(state.duplicates_skipped(), 700);
    }
}

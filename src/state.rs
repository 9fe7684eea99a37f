// src/state.rs
//! Concurrent scrape-state tracker: an active table keyed by source id plus
//! a bounded, most-recent-first history of terminal states. Shared-read /
//! exclusive-write; readers always get independent snapshots.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

const HISTORY_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeState {
    pub source_id: i64,
    pub source_name: String,
    pub status: ScrapeStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub entries_found: usize,
    pub entries_inserted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Default)]
struct Inner {
    active: HashMap<i64, ScrapeState>,
    // Front = most recent terminal state.
    recent: VecDeque<ScrapeState>,
}

/// Injected wherever scrape progress needs to be observed or recorded.
/// At most one active state exists per source id; a second `start_scrape`
/// for the same id silently overwrites the first (no cross-trigger mutual
/// exclusion at this layer).
#[derive(Default)]
pub struct StateStore {
    inner: RwLock<Inner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_scrape(&self, source_id: i64, source_name: &str) {
        let mut inner = self.inner.write().expect("state store poisoned");
        inner.active.insert(
            source_id,
            ScrapeState {
                source_id,
                source_name: source_name.to_string(),
                status: ScrapeStatus::Running,
                started_at: Utc::now(),
                completed_at: None,
                entries_found: 0,
                entries_inserted: 0,
                error: None,
            },
        );
    }

    /// Finalizes the active state as completed. No-op when no scrape was
    /// started for this id, which guards against double finalization.
    pub fn complete_scrape(&self, source_id: i64, entries_found: usize, entries_inserted: usize) {
        let mut inner = self.inner.write().expect("state store poisoned");
        let Some(mut state) = inner.active.remove(&source_id) else {
            return;
        };
        state.status = ScrapeStatus::Completed;
        state.completed_at = Some(Utc::now());
        state.entries_found = entries_found;
        state.entries_inserted = entries_inserted;
        push_recent(&mut inner, state);
    }

    /// Finalizes the active state as failed. No-op when no scrape was started.
    pub fn fail_scrape(&self, source_id: i64, error: &str) {
        let mut inner = self.inner.write().expect("state store poisoned");
        let Some(mut state) = inner.active.remove(&source_id) else {
            return;
        };
        state.status = ScrapeStatus::Failed;
        state.completed_at = Some(Utc::now());
        state.error = Some(error.to_string());
        push_recent(&mut inner, state);
    }

    /// Records a failure for an attempt that never reached the running state
    /// (source lookup failed before anything was known about it). Goes
    /// straight to history; the active table is untouched.
    pub fn push_failed(&self, source_id: i64, source_name: &str, error: &str) {
        let mut inner = self.inner.write().expect("state store poisoned");
        let now = Utc::now();
        push_recent(
            &mut inner,
            ScrapeState {
                source_id,
                source_name: source_name.to_string(),
                status: ScrapeStatus::Failed,
                started_at: now,
                completed_at: Some(now),
                entries_found: 0,
                entries_inserted: 0,
                error: Some(error.to_string()),
            },
        );
    }

    pub fn scrape_state(&self, source_id: i64) -> Option<ScrapeState> {
        let inner = self.inner.read().expect("state store poisoned");
        inner.active.get(&source_id).cloned()
    }

    pub fn active_scrapes(&self) -> Vec<ScrapeState> {
        let inner = self.inner.read().expect("state store poisoned");
        inner.active.values().cloned().collect()
    }

    /// Most recent first, at most `limit` entries.
    pub fn recent_scrapes(&self, limit: usize) -> Vec<ScrapeState> {
        let inner = self.inner.read().expect("state store poisoned");
        inner.recent.iter().take(limit).cloned().collect()
    }
}

fn push_recent(inner: &mut Inner, state: ScrapeState) {
    inner.recent.push_front(state);
    inner.recent.truncate(HISTORY_CAP);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_transition_moves_record_to_history_front() {
        let store = StateStore::new();
        store.start_scrape(1, "alpha");
        assert_eq!(store.scrape_state(1).unwrap().status, ScrapeStatus::Running);

        store.complete_scrape(1, 3, 2);
        assert!(store.scrape_state(1).is_none());

        let recent = store.recent_scrapes(10);
        assert_eq!(recent[0].source_id, 1);
        assert_eq!(recent[0].status, ScrapeStatus::Completed);
        assert_eq!(recent[0].entries_found, 3);
        assert_eq!(recent[0].entries_inserted, 2);
        assert!(recent[0].completed_at.is_some());
    }

    #[test]
    fn failure_records_error_and_clears_active() {
        let store = StateStore::new();
        store.start_scrape(7, "beta");
        store.fail_scrape(7, "fetch failed: connection refused");

        assert!(store.scrape_state(7).is_none());
        let recent = store.recent_scrapes(1);
        assert_eq!(recent[0].status, ScrapeStatus::Failed);
        assert_eq!(
            recent[0].error.as_deref(),
            Some("fetch failed: connection refused")
        );
    }

    #[test]
    fn finalizing_without_start_is_a_noop() {
        let store = StateStore::new();
        store.complete_scrape(42, 1, 1);
        store.fail_scrape(42, "boom");
        assert!(store.recent_scrapes(10).is_empty());
    }

    #[test]
    fn second_start_overwrites_first() {
        let store = StateStore::new();
        store.start_scrape(5, "first");
        store.start_scrape(5, "second");
        assert_eq!(store.active_scrapes().len(), 1);
        assert_eq!(store.scrape_state(5).unwrap().source_name, "second");
    }

    #[test]
    fn history_is_bounded_at_fifty_with_oldest_evicted() {
        let store = StateStore::new();
        for id in 0..55 {
            store.start_scrape(id, "src");
            store.complete_scrape(id, 0, 0);
        }
        let recent = store.recent_scrapes(1000);
        assert_eq!(recent.len(), 50);
        // Most recent first; ids 0..=4 were evicted.
        assert_eq!(recent[0].source_id, 54);
        assert_eq!(recent[49].source_id, 5);
    }

    #[test]
    fn unstarted_failure_goes_straight_to_history() {
        let store = StateStore::new();
        store.push_failed(9, "unknown", "source lookup failed");
        assert!(store.scrape_state(9).is_none());
        let recent = store.recent_scrapes(1);
        assert_eq!(recent[0].status, ScrapeStatus::Failed);
    }
}

// src/store.rs
//! Persistence seam. The core only needs the handful of operations in the
//! `Store` trait; the bundled `MemoryStore` backs the binary and every test.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::ScrapedCandidate;

/// A registered scrape target. Created through the management surface and
/// read-only to the scrape engine.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Candidate plus its owning source, ready for insertion.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub source_id: i64,
    pub title: String,
    pub cleaned_content: String,
    pub share_date: Option<DateTime<Utc>>,
    pub criticality_score: u8,
    pub category: String,
}

impl NewEntry {
    pub fn from_candidate(source_id: i64, candidate: &ScrapedCandidate) -> Self {
        Self {
            source_id,
            title: candidate.title.clone(),
            cleaned_content: candidate.cleaned_content.clone(),
            share_date: candidate.share_date,
            criticality_score: candidate.criticality_score,
            category: candidate.category.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredEntry {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub cleaned_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_date: Option<DateTime<Utc>>,
    pub criticality_score: u8,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The persistence operations the scrape engine consumes. Uniqueness of
/// `(source_id, title)` is enforced by an `entry_exists` check before
/// insert, not by a storage-level constraint.
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_source_ids(&self) -> Result<Vec<i64>>;
    async fn source_by_id(&self, id: i64) -> Result<Source>;
    async fn entry_exists(&self, source_id: i64, title: &str) -> Result<bool>;
    async fn insert_entry(&self, entry: NewEntry) -> Result<i64>;
    async fn update_analysis(&self, entry_id: i64, analysis: &str) -> Result<()>;
}

#[derive(Default)]
struct MemInner {
    sources: HashMap<i64, Source>,
    entries: HashMap<i64, StoredEntry>,
    next_source_id: i64,
    next_entry_id: i64,
}

/// In-memory store. Single mutex; every operation is short.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Management operation: registers a source and returns it.
    pub fn add_source(&self, name: &str, url: &str) -> Source {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.next_source_id += 1;
        let source = Source {
            id: inner.next_source_id,
            name: name.to_string(),
            url: url.to_string(),
            created_at: Utc::now(),
        };
        inner.sources.insert(source.id, source.clone());
        source
    }

    /// Snapshot of all stored entries, insertion order not guaranteed.
    pub fn entries(&self) -> Vec<StoredEntry> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner.entries.values().cloned().collect()
    }

    pub fn entry_count(&self) -> usize {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner.entries.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_source_ids(&self) -> Result<Vec<i64>> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut ids: Vec<i64> = inner.sources.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn source_by_id(&self, id: i64) -> Result<Source> {
        let inner = self.inner.lock().expect("memory store poisoned");
        match inner.sources.get(&id) {
            Some(source) => Ok(source.clone()),
            None => bail!("source {id} not found"),
        }
    }

    async fn entry_exists(&self, source_id: i64, title: &str) -> Result<bool> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .entries
            .values()
            .any(|e| e.source_id == source_id && e.title == title))
    }

    async fn insert_entry(&self, entry: NewEntry) -> Result<i64> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.next_entry_id += 1;
        let id = inner.next_entry_id;
        inner.entries.insert(
            id,
            StoredEntry {
                id,
                source_id: entry.source_id,
                title: entry.title,
                cleaned_content: entry.cleaned_content,
                share_date: entry.share_date,
                criticality_score: entry.criticality_score,
                category: entry.category,
                ai_analysis: None,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn update_analysis(&self, entry_id: i64, analysis: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        match inner.entries.get_mut(&entry_id) {
            Some(entry) => {
                entry.ai_analysis = Some(analysis.to_string());
                Ok(())
            }
            None => bail!("entry {entry_id} not found"),
        }
    }
}

// tests/scrape_flow.rs
// End-to-end orchestrator behavior against an in-memory store and a
// deterministic transport: state transitions, dedup, failure isolation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use threat_intel_scraper::scraper::ScrapePolicy;
use threat_intel_scraper::transport::{NetworkStatus, ReadinessStatus, Transport};
use threat_intel_scraper::{
    Analyzer, DisabledAnalyzer, MemoryStore, NewEntry, ScrapeStatus, Scraper, Source, StateStore,
    Store,
};

const PAGE: &str = r#"<html><head><title>Massive breach confirmed at hosting firm</title>
<meta property="article:published_time" content="2024-05-01T10:00:00Z"></head>
<body><p>Stolen data from the database dump was leaked on a forum. The breach
was confirmed by the vendor and credentials leaked in bulk.</p></body></html>"#;

struct FixedPage {
    body: String,
}

#[async_trait]
impl Transport for FixedPage {
    async fn fetch(&self, _url: &str) -> Result<String> {
        Ok(self.body.clone())
    }

    async fn check_readiness(&self) -> ReadinessStatus {
        ReadinessStatus {
            is_ready: true,
            bootstrap_percent: 100,
            message: "ready".into(),
        }
    }

    async fn check_status(&self) -> NetworkStatus {
        NetworkStatus {
            is_connected: true,
            exit_address: Some("185.220.101.4".into()),
            message: "ok".into(),
        }
    }
}

struct FailingFetch;

#[async_trait]
impl Transport for FailingFetch {
    async fn fetch(&self, url: &str) -> Result<String> {
        bail!("failed to fetch {url}: connection refused")
    }

    async fn check_readiness(&self) -> ReadinessStatus {
        ReadinessStatus {
            is_ready: true,
            bootstrap_percent: 100,
            message: "ready".into(),
        }
    }

    async fn check_status(&self) -> NetworkStatus {
        NetworkStatus {
            is_connected: false,
            exit_address: None,
            message: "down".into(),
        }
    }
}

fn fast_policy() -> ScrapePolicy {
    ScrapePolicy {
        interval: Duration::from_secs(30),
        source_pause: Duration::from_millis(1),
        fetch_attempts: 3,
        fetch_base_delay: Duration::from_millis(5),
    }
}

fn build_scraper(store: Arc<MemoryStore>, transport: Arc<dyn Transport>) -> Arc<Scraper> {
    Arc::new(Scraper::new(
        store,
        transport,
        Arc::new(StateStore::new()),
        Arc::new(DisabledAnalyzer),
        fast_policy(),
    ))
}

#[tokio::test]
async fn successful_scrape_completes_and_inserts_one_entry() {
    let store = Arc::new(MemoryStore::new());
    let source = store.add_source("leak forum", "http://forum.example.onion");
    let scraper = build_scraper(store.clone(), Arc::new(FixedPage { body: PAGE.into() }));

    scraper.scrape_source(source.id).await;

    assert!(scraper.scrape_state(source.id).is_none());
    let recent = scraper.recent_scrapes(10);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].status, ScrapeStatus::Completed);
    assert_eq!(recent[0].entries_found, 1);
    assert_eq!(recent[0].entries_inserted, 1);

    let entries = store.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "Massive breach confirmed at hosting firm");
    assert_eq!(entries[0].category, "Data Breach");
    assert_eq!(
        entries[0].share_date.map(|d| d.to_rfc3339()),
        Some("2024-05-01T10:00:00+00:00".to_string())
    );
}

#[tokio::test]
async fn second_scrape_of_same_content_is_deduplicated() {
    let store = Arc::new(MemoryStore::new());
    let source = store.add_source("leak forum", "http://forum.example.onion");
    let scraper = build_scraper(store.clone(), Arc::new(FixedPage { body: PAGE.into() }));

    scraper.scrape_source(source.id).await;
    scraper.scrape_source(source.id).await;

    assert_eq!(store.entry_count(), 1);
    let recent = scraper.recent_scrapes(10);
    assert_eq!(recent.len(), 2);
    // Most recent first: the second run found the candidate but inserted nothing.
    assert_eq!(recent[0].status, ScrapeStatus::Completed);
    assert_eq!(recent[0].entries_found, 1);
    assert_eq!(recent[0].entries_inserted, 0);
    assert_eq!(recent[1].entries_inserted, 1);
}

#[tokio::test]
async fn nonexistent_source_fails_terminally_without_active_entry() {
    let store = Arc::new(MemoryStore::new());
    let scraper = build_scraper(store, Arc::new(FixedPage { body: PAGE.into() }));

    scraper.scrape_source(999).await;

    assert!(scraper.scrape_state(999).is_none());
    let recent = scraper.recent_scrapes(10);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].status, ScrapeStatus::Failed);
    assert!(recent[0]
        .error
        .as_deref()
        .unwrap()
        .contains("source lookup failed"));
}

#[tokio::test]
async fn invalid_url_scheme_fails_the_scrape() {
    let store = Arc::new(MemoryStore::new());
    let source = store.add_source("bad", "ftp://example.com/feed");
    let scraper = build_scraper(store, Arc::new(FixedPage { body: PAGE.into() }));

    scraper.scrape_source(source.id).await;

    let recent = scraper.recent_scrapes(1);
    assert_eq!(recent[0].status, ScrapeStatus::Failed);
    assert!(recent[0].error.as_deref().unwrap().contains("invalid URL format"));
}

#[tokio::test]
async fn empty_url_fails_the_scrape() {
    let store = Arc::new(MemoryStore::new());
    let source = store.add_source("empty", "");
    let scraper = build_scraper(store, Arc::new(FixedPage { body: PAGE.into() }));

    scraper.scrape_source(source.id).await;

    let recent = scraper.recent_scrapes(1);
    assert_eq!(recent[0].status, ScrapeStatus::Failed);
    assert!(recent[0].error.as_deref().unwrap().contains("source URL is empty"));
}

#[tokio::test]
async fn fetch_failure_after_retries_fails_the_scrape() {
    let store = Arc::new(MemoryStore::new());
    let source = store.add_source("down", "http://down.example.onion");
    let scraper = build_scraper(store.clone(), Arc::new(FailingFetch));

    scraper.scrape_source(source.id).await;

    assert_eq!(store.entry_count(), 0);
    let recent = scraper.recent_scrapes(1);
    assert_eq!(recent[0].status, ScrapeStatus::Failed);
    assert!(recent[0].error.as_deref().unwrap().contains("fetch failed"));
}

#[tokio::test]
async fn short_body_completes_with_zero_candidates() {
    let store = Arc::new(MemoryStore::new());
    let source = store.add_source("thin", "http://thin.example.onion");
    let scraper = build_scraper(
        store.clone(),
        Arc::new(FixedPage {
            body: "tiny".into(),
        }),
    );

    scraper.scrape_source(source.id).await;

    assert_eq!(store.entry_count(), 0);
    let recent = scraper.recent_scrapes(1);
    assert_eq!(recent[0].status, ScrapeStatus::Completed);
    assert_eq!(recent[0].entries_found, 0);
    assert_eq!(recent[0].entries_inserted, 0);
}

#[tokio::test]
async fn scrape_all_isolates_per_source_failures() {
    let store = Arc::new(MemoryStore::new());
    let good = store.add_source("good", "http://good.example.onion");
    let bad = store.add_source("bad", "not-a-url");
    let scraper = build_scraper(store.clone(), Arc::new(FixedPage { body: PAGE.into() }));

    scraper.scrape_all().await;

    assert_eq!(store.entry_count(), 1);
    let recent = scraper.recent_scrapes(10);
    assert_eq!(recent.len(), 2);
    let for_good = recent.iter().find(|s| s.source_id == good.id).unwrap();
    let for_bad = recent.iter().find(|s| s.source_id == bad.id).unwrap();
    assert_eq!(for_good.status, ScrapeStatus::Completed);
    assert_eq!(for_bad.status, ScrapeStatus::Failed);
}

/// Store whose dedup check or insert fails with a transient error while
/// source lookup still works.
struct FlakyStore {
    fail_dedup: bool,
}

#[async_trait]
impl Store for FlakyStore {
    async fn list_source_ids(&self) -> Result<Vec<i64>> {
        Ok(vec![1])
    }

    async fn source_by_id(&self, id: i64) -> Result<Source> {
        Ok(Source {
            id,
            name: "flaky".into(),
            url: "http://flaky.example.onion".into(),
            created_at: chrono::Utc::now(),
        })
    }

    async fn entry_exists(&self, _source_id: i64, _title: &str) -> Result<bool> {
        if self.fail_dedup {
            bail!("transient database error")
        }
        Ok(false)
    }

    async fn insert_entry(&self, _entry: NewEntry) -> Result<i64> {
        bail!("transient database error")
    }

    async fn update_analysis(&self, _entry_id: i64, _analysis: &str) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn dedup_check_error_skips_candidate_but_completes() {
    let scraper = Arc::new(Scraper::new(
        Arc::new(FlakyStore { fail_dedup: true }),
        Arc::new(FixedPage { body: PAGE.into() }),
        Arc::new(StateStore::new()),
        Arc::new(DisabledAnalyzer),
        fast_policy(),
    ));

    scraper.scrape_source(1).await;

    let recent = scraper.recent_scrapes(1);
    assert_eq!(recent[0].status, ScrapeStatus::Completed);
    assert_eq!(recent[0].entries_found, 1);
    assert_eq!(recent[0].entries_inserted, 0);
    assert!(recent[0].error.is_none());
}

#[tokio::test]
async fn insert_error_skips_candidate_but_completes() {
    let scraper = Arc::new(Scraper::new(
        Arc::new(FlakyStore { fail_dedup: false }),
        Arc::new(FixedPage { body: PAGE.into() }),
        Arc::new(StateStore::new()),
        Arc::new(DisabledAnalyzer),
        fast_policy(),
    ));

    scraper.scrape_source(1).await;

    let recent = scraper.recent_scrapes(1);
    assert_eq!(recent[0].status, ScrapeStatus::Completed);
    assert_eq!(recent[0].entries_found, 1);
    assert_eq!(recent[0].entries_inserted, 0);
    assert!(recent[0].error.is_none());
}

struct RecordingAnalyzer;

#[async_trait]
impl Analyzer for RecordingAnalyzer {
    async fn analyze(
        &self,
        _title: &str,
        _content: &str,
        category: &str,
        criticality_score: u8,
    ) -> Result<Option<String>> {
        Ok(Some(format!("{category} rated {criticality_score}")))
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn analysis_is_applied_out_of_band_after_insert() {
    let store = Arc::new(MemoryStore::new());
    let source = store.add_source("leak forum", "http://forum.example.onion");
    let scraper = Arc::new(Scraper::new(
        store.clone(),
        Arc::new(FixedPage { body: PAGE.into() }),
        Arc::new(StateStore::new()),
        Arc::new(RecordingAnalyzer),
        fast_policy(),
    ));

    scraper.scrape_source(source.id).await;

    // The dispatch is detached; poll briefly for the write-back.
    let mut analysis = None;
    for _ in 0..50 {
        analysis = store.entries()[0].ai_analysis.clone();
        if analysis.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(analysis.as_deref(), Some("Data Breach rated 92"));
}

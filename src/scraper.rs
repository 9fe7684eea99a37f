// src/scraper.rs
//! Orchestrator: drives catalog-wide and per-source scrape cycles over the
//! transport, content pipeline, state tracker, store, and optional analyzer.
//! Sources are always processed one at a time with a pause in between, since
//! all fetches share one proxy circuit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::analyzer::Analyzer;
use crate::pipeline::{self, ScrapedCandidate};
use crate::state::{ScrapeState, StateStore};
use crate::store::{NewEntry, Source, Store};
use crate::transport::Transport;

/// Bounded wait used when a per-source readiness check comes back negative.
const SOURCE_WAIT_ATTEMPTS: u32 = 5;
const SOURCE_WAIT_DELAY: Duration = Duration::from_secs(2);
/// Boot-time wait; best effort, the loop starts regardless of the outcome.
const BOOT_WAIT_ATTEMPTS: u32 = 20;
const BOOT_WAIT_DELAY: Duration = Duration::from_secs(3);

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scrape_cycles_total", "Catalog-wide scrape cycles run.");
        describe_counter!("scrape_runs_total", "Per-source scrape attempts.");
        describe_counter!("scrape_failures_total", "Per-source scrape attempts that failed.");
        describe_counter!("scrape_entries_inserted_total", "New entries inserted.");
        describe_counter!("scrape_entries_deduped_total", "Candidates skipped as duplicates.");
    });
}

#[derive(Debug, Clone)]
pub struct ScrapePolicy {
    pub interval: Duration,
    pub source_pause: Duration,
    pub fetch_attempts: u32,
    pub fetch_base_delay: Duration,
}

impl Default for ScrapePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            source_pause: Duration::from_secs(2),
            fetch_attempts: 3,
            fetch_base_delay: Duration::from_secs(5),
        }
    }
}

pub struct Scraper {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    state: Arc<StateStore>,
    analyzer: Arc<dyn Analyzer>,
    policy: ScrapePolicy,
}

impl Scraper {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        state: Arc<StateStore>,
        analyzer: Arc<dyn Analyzer>,
        policy: ScrapePolicy,
    ) -> Self {
        ensure_metrics_described();
        Self {
            store,
            transport,
            state,
            analyzer,
            policy,
        }
    }

    /// Blocking entrypoint for the periodic cycle. Waits (best effort) for
    /// the proxy, runs one immediate full pass, then repeats on a fixed
    /// period for the life of the process.
    pub async fn run_loop(self: Arc<Self>) {
        info!("scraper starting, waiting for proxy to become ready");
        if let Err(e) = self
            .transport
            .wait_for_ready(BOOT_WAIT_ATTEMPTS, BOOT_WAIT_DELAY)
            .await
        {
            warn!(error = %e, "proxy did not become ready; scrapes may fail until it bootstraps");
        } else {
            info!("proxy is ready, starting scrape loop");
        }

        let mut ticker = tokio::time::interval(self.policy.interval);
        loop {
            ticker.tick().await;
            self.scrape_all().await;
        }
    }

    /// Scrapes every known source, strictly sequentially, with a pause
    /// between sources. Failures are isolated per source.
    pub async fn scrape_all(&self) {
        counter!("scrape_cycles_total").increment(1);

        let source_ids = match self.store.list_source_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "failed to list sources");
                return;
            }
        };

        if source_ids.is_empty() {
            warn!("no sources registered, nothing to scrape");
            return;
        }

        info!(count = source_ids.len(), "starting scrape cycle");
        for (i, source_id) in source_ids.iter().enumerate() {
            self.scrape_source(*source_id).await;
            if i + 1 < source_ids.len() {
                tokio::time::sleep(self.policy.source_pause).await;
            }
        }
        info!(count = source_ids.len(), "scrape cycle finished");
    }

    /// Runs one scrape attempt for a source. Always leaves a terminal state
    /// behind: lookup errors are recorded directly, and once the running
    /// state is entered every error path funnels into `fail_scrape`.
    pub async fn scrape_source(&self, source_id: i64) {
        counter!("scrape_runs_total").increment(1);

        let source = match self.store.source_by_id(source_id).await {
            Ok(s) => s,
            Err(e) => {
                error!(source_id, error = %e, "source lookup failed");
                self.state
                    .push_failed(source_id, "unknown", &format!("source lookup failed: {e:#}"));
                counter!("scrape_failures_total").increment(1);
                return;
            }
        };

        self.state.start_scrape(source_id, &source.name);

        match self.scrape_inner(&source).await {
            Ok((found, inserted)) => {
                info!(
                    source_id,
                    source = %source.name,
                    entries_found = found,
                    entries_inserted = inserted,
                    "scrape completed"
                );
                self.state.complete_scrape(source_id, found, inserted);
            }
            Err(e) => {
                error!(source_id, source = %source.name, error = %e, "scrape failed");
                self.state.fail_scrape(source_id, &format!("{e:#}"));
                counter!("scrape_failures_total").increment(1);
            }
        }
    }

    /// The attempt body; every error bubbles up to become a failed terminal
    /// state. Returns (candidates processed, entries inserted).
    async fn scrape_inner(&self, source: &Source) -> Result<(usize, usize)> {
        if source.url.is_empty() {
            bail!("source URL is empty");
        }
        if !source.url.starts_with("http://") && !source.url.starts_with("https://") {
            bail!("invalid URL format: must start with http:// or https://");
        }

        let readiness = self.transport.check_readiness().await;
        if !readiness.is_ready {
            warn!(source_id = source.id, message = %readiness.message, "proxy not ready, waiting");
            self.transport
                .wait_for_ready(SOURCE_WAIT_ATTEMPTS, SOURCE_WAIT_DELAY)
                .await
                .context("proxy not ready")?;
        }

        let raw = self
            .transport
            .fetch_with_retry(
                &source.url,
                self.policy.fetch_attempts,
                self.policy.fetch_base_delay,
            )
            .await
            .context("fetch failed")?;
        if raw.is_empty() {
            bail!("no content fetched from URL");
        }

        let Some(candidate) = pipeline::process_content(&raw) else {
            info!(source_id = source.id, "content too short, no candidate produced");
            return Ok((0, 0));
        };

        // Store errors past this point skip the candidate but leave the
        // scrape itself completed; only lookup/URL/readiness/fetch errors
        // fail the attempt.
        match self.store.entry_exists(source.id, &candidate.title).await {
            Ok(true) => {
                info!(source_id = source.id, title = %candidate.title, "entry already exists, skipping");
                counter!("scrape_entries_deduped_total").increment(1);
                return Ok((1, 0));
            }
            Ok(false) => {}
            Err(e) => {
                error!(source_id = source.id, title = %candidate.title, error = %e, "dedup check failed, skipping candidate");
                return Ok((1, 0));
            }
        }

        let entry_id = match self
            .store
            .insert_entry(NewEntry::from_candidate(source.id, &candidate))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(source_id = source.id, title = %candidate.title, error = %e, "insert failed, skipping candidate");
                return Ok((1, 0));
            }
        };
        counter!("scrape_entries_inserted_total").increment(1);
        info!(
            source_id = source.id,
            entry_id,
            title = %candidate.title,
            category = %candidate.category,
            criticality = candidate.criticality_score,
            "new entry inserted"
        );

        self.dispatch_analysis(entry_id, &candidate);
        Ok((1, 1))
    }

    /// Detached annotation call. Its result is written back out-of-band and
    /// its failure only logs; the scrape outcome is already sealed.
    fn dispatch_analysis(&self, entry_id: i64, candidate: &ScrapedCandidate) {
        if !self.analyzer.is_enabled() {
            return;
        }

        let analyzer = self.analyzer.clone();
        let store = self.store.clone();
        let title = candidate.title.clone();
        let content = candidate.cleaned_content.clone();
        let category = candidate.category.clone();
        let criticality = candidate.criticality_score;

        tokio::spawn(async move {
            match analyzer
                .analyze(&title, &content, &category, criticality)
                .await
            {
                Ok(Some(analysis)) => {
                    if let Err(e) = store.update_analysis(entry_id, &analysis).await {
                        warn!(entry_id, error = %e, "failed to store analysis");
                    } else {
                        info!(entry_id, "analysis stored");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(entry_id, error = %e, "analysis failed, scrape outcome unaffected");
                }
            }
        });
    }

    // ---- Observer surface ----

    pub fn scrape_state(&self, source_id: i64) -> Option<ScrapeState> {
        self.state.scrape_state(source_id)
    }

    pub fn active_scrapes(&self) -> Vec<ScrapeState> {
        self.state.active_scrapes()
    }

    pub fn recent_scrapes(&self, limit: usize) -> Vec<ScrapeState> {
        self.state.recent_scrapes(limit)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

#[derive(Debug, Clone, Copy)]
enum ScrapeJob {
    All,
    Source(i64),
}

/// Trigger surface: a bounded queue drained by a fixed-size worker pool.
/// When the queue is full the caller gets an error, not a silent spawn.
#[derive(Clone)]
pub struct ScrapeQueue {
    tx: mpsc::Sender<ScrapeJob>,
}

impl ScrapeQueue {
    pub fn start(scraper: Arc<Scraper>, capacity: usize, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<ScrapeJob>(capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        for worker in 0..workers.max(1) {
            let scraper = scraper.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(ScrapeJob::All) => scraper.scrape_all().await,
                        Some(ScrapeJob::Source(id)) => scraper.scrape_source(id).await,
                        None => {
                            info!(worker, "scrape queue closed, worker exiting");
                            break;
                        }
                    }
                }
            });
        }

        Self { tx }
    }

    pub fn trigger_all(&self) -> Result<()> {
        self.enqueue(ScrapeJob::All)
    }

    pub fn trigger_source(&self, source_id: i64) -> Result<()> {
        self.enqueue(ScrapeJob::Source(source_id))
    }

    fn enqueue(&self, job: ScrapeJob) -> Result<()> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => anyhow!("scrape queue is full"),
            mpsc::error::TrySendError::Closed(_) => anyhow!("scrape queue is closed"),
        })
    }
}

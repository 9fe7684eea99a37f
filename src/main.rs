//! Binary entrypoint: wires config, transport, store, state tracker, and the
//! analyzer together, spawns the periodic scrape loop, and serves the thin
//! status API.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use threat_intel_scraper::api::{self, ApiState};
use threat_intel_scraper::metrics::Metrics;
use threat_intel_scraper::scraper::ScrapePolicy;
use threat_intel_scraper::{
    build_analyzer, Config, MemoryStore, ProxyTransport, ScrapeQueue, Scraper, StateStore,
};

const TRIGGER_QUEUE_CAPACITY: usize = 32;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("threat_intel_scraper=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::load().context("loading configuration")?;
    info!(proxy = %config.proxy_addr, sources = config.sources.len(), "configuration loaded");

    let metrics = Metrics::init();

    let store = Arc::new(MemoryStore::new());
    for configured in &config.sources {
        let source = store.add_source(&configured.name, &configured.url);
        info!(id = source.id, name = %source.name, "registered source");
    }
    if config.sources.is_empty() {
        warn!("no sources configured; scrape cycles will be empty until sources are added");
    }

    let transport = Arc::new(ProxyTransport::new(config.proxy_addr.clone()));
    let analyzer = build_analyzer(&config);
    let state = Arc::new(StateStore::new());

    let policy = ScrapePolicy {
        interval: config.scrape_interval(),
        source_pause: config.source_pause(),
        fetch_attempts: config.fetch_attempts,
        fetch_base_delay: config.fetch_base_delay(),
    };
    let scraper = Arc::new(Scraper::new(
        store.clone(),
        transport,
        state,
        analyzer,
        policy,
    ));

    let queue = ScrapeQueue::start(scraper.clone(), TRIGGER_QUEUE_CAPACITY, config.worker_count);

    tokio::spawn(scraper.clone().run_loop());

    let router = api::create_router(ApiState {
        scraper,
        queue,
    })
    .merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "serving status API");
    axum::serve(listener, router).await.context("serving API")?;

    Ok(())
}

// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod analyzer;
pub mod api;
pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod scraper;
pub mod state;
pub mod store;
pub mod transport;

// ---- Re-exports for stable public API ----
pub use crate::analyzer::{build_analyzer, Analyzer, DisabledAnalyzer, HttpAnalyzer};
pub use crate::config::Config;
pub use crate::pipeline::ScrapedCandidate;
pub use crate::scraper::{ScrapeQueue, Scraper};
pub use crate::state::{ScrapeState, ScrapeStatus, StateStore};
pub use crate::store::{MemoryStore, NewEntry, Source, Store, StoredEntry};
pub use crate::transport::{NetworkStatus, ProxyTransport, ReadinessStatus, Transport};

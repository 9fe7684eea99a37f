// src/config.rs
//! Runtime configuration: defaults, then an optional `config/scraper.toml`,
//! then environment variables (env wins).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/scraper.toml";
pub const ENV_CONFIG_PATH: &str = "SCRAPER_CONFIG_PATH";
pub const ENV_PROXY_ADDR: &str = "TOR_PROXY";
pub const ENV_ANALYZER_URL: &str = "AI_SERVICE_URL";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";

const DEFAULT_PROXY_ADDR: &str = "tor:9050";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// A source registered at startup from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// SOCKS5 proxy `host:port`.
    pub proxy_addr: String,
    /// Annotation service base URL; `None` disables the analyzer.
    pub analyzer_url: Option<String>,
    pub bind_addr: String,
    pub scrape_interval_secs: u64,
    pub source_pause_secs: u64,
    pub fetch_attempts: u32,
    pub fetch_base_delay_secs: u64,
    /// Workers draining the trigger queue. One by default: all fetches share
    /// a single proxy circuit.
    pub worker_count: usize,
    pub sources: Vec<SourceSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_addr: DEFAULT_PROXY_ADDR.to_string(),
            analyzer_url: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            scrape_interval_secs: 30,
            source_pause_secs: 2,
            fetch_attempts: 3,
            fetch_base_delay_secs: 5,
            worker_count: 1,
            sources: Vec::new(),
        }
    }
}

/// File layer; every field optional so a partial file overlays defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    proxy_addr: Option<String>,
    analyzer_url: Option<String>,
    bind_addr: Option<String>,
    scrape_interval_secs: Option<u64>,
    source_pause_secs: Option<u64>,
    fetch_attempts: Option<u32>,
    fetch_base_delay_secs: Option<u64>,
    worker_count: Option<usize>,
    #[serde(default)]
    sources: Vec<SourceSpec>,
}

impl Config {
    /// Load order: defaults <- optional TOML file <- environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Config::default();

        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            let file: FileConfig = toml::from_str(&raw)
                .with_context(|| format!("parsing config from {}", path.display()))?;
            config.apply_file(file);
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.proxy_addr {
            self.proxy_addr = v;
        }
        if file.analyzer_url.is_some() {
            self.analyzer_url = file.analyzer_url;
        }
        if let Some(v) = file.bind_addr {
            self.bind_addr = v;
        }
        if let Some(v) = file.scrape_interval_secs {
            self.scrape_interval_secs = v;
        }
        if let Some(v) = file.source_pause_secs {
            self.source_pause_secs = v;
        }
        if let Some(v) = file.fetch_attempts {
            self.fetch_attempts = v;
        }
        if let Some(v) = file.fetch_base_delay_secs {
            self.fetch_base_delay_secs = v;
        }
        if let Some(v) = file.worker_count {
            self.worker_count = v.max(1);
        }
        self.sources = file.sources;
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var(ENV_PROXY_ADDR) {
            if !v.is_empty() {
                self.proxy_addr = v;
            }
        }
        if let Ok(v) = std::env::var(ENV_ANALYZER_URL) {
            if !v.is_empty() {
                self.analyzer_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var(ENV_BIND_ADDR) {
            if !v.is_empty() {
                self.bind_addr = v;
            }
        }
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_secs)
    }

    pub fn source_pause(&self) -> Duration {
        Duration::from_secs(self.source_pause_secs)
    }

    pub fn fetch_base_delay(&self) -> Duration {
        Duration::from_secs(self.fetch_base_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[serial_test::serial]
    #[test]
    fn defaults_apply_without_file_or_env() {
        std::env::remove_var(ENV_PROXY_ADDR);
        std::env::remove_var(ENV_ANALYZER_URL);
        std::env::remove_var(ENV_BIND_ADDR);

        let cfg = Config::load_from(Path::new("/nonexistent/scraper.toml")).unwrap();
        assert_eq!(cfg.proxy_addr, "tor:9050");
        assert_eq!(cfg.analyzer_url, None);
        assert_eq!(cfg.scrape_interval_secs, 30);
        assert_eq!(cfg.worker_count, 1);
        assert!(cfg.sources.is_empty());
    }

    #[serial_test::serial]
    #[test]
    fn file_overlays_defaults_and_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraper.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
proxy_addr = "filetor:9050"
scrape_interval_secs = 60

[[sources]]
name = "leak forum"
url = "http://forum.example.onion"
"#
        )
        .unwrap();

        std::env::set_var(ENV_PROXY_ADDR, "envtor:9050");
        std::env::remove_var(ENV_ANALYZER_URL);
        std::env::remove_var(ENV_BIND_ADDR);

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.proxy_addr, "envtor:9050");
        assert_eq!(cfg.scrape_interval_secs, 60);
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.sources[0].name, "leak forum");

        std::env::remove_var(ENV_PROXY_ADDR);
    }
}

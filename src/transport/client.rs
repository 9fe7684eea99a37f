// src/transport/client.rs
//! Cached reqwest client dialing exclusively through the SOCKS5 proxy,
//! plus the single-shot fetch with content-type gating.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use tracing::warn;

use super::readiness::ReadinessStatus;
use super::status::{NetworkStatus, StatusCache};
use super::Transport;

/// Browser-like UA so lite/text mirrors serve the same markup they serve browsers.
pub(crate) const BROWSER_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

const CLIENT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(90);

/// Content types we will read a body for. Everything else is rejected
/// before the body is consumed.
const TEXT_CONTENT_PREFIXES: [&str; 4] =
    ["text/html", "text/plain", "application/xhtml", "application/xml"];

struct CachedClient {
    client: reqwest::Client,
    built_at: Instant,
}

/// Production transport: every request is dialed through the configured
/// SOCKS5 proxy (`socks5h` so DNS resolves on the proxy side, which .onion
/// hosts require). Owns the client cache and the status-probe cache; no
/// process-wide globals.
pub struct ProxyTransport {
    proxy_addr: String,
    client_cache: RwLock<Option<CachedClient>>,
    pub(super) status_cache: StatusCache,
}

impl ProxyTransport {
    pub fn new(proxy_addr: impl Into<String>) -> Self {
        Self {
            proxy_addr: proxy_addr.into(),
            client_cache: RwLock::new(None),
            status_cache: StatusCache::new(),
        }
    }

    pub fn proxy_addr(&self) -> &str {
        &self.proxy_addr
    }

    /// Returns the cached client, rebuilding it after the TTL expires.
    /// Concurrent callers may race to rebuild; the replace is idempotent.
    pub fn client(&self) -> Result<reqwest::Client> {
        {
            let guard = self.client_cache.read().expect("client cache poisoned");
            if let Some(cached) = guard.as_ref() {
                if cached.built_at.elapsed() < CLIENT_CACHE_TTL {
                    return Ok(cached.client.clone());
                }
            }
        }

        let client = self.build_client()?;
        let mut guard = self.client_cache.write().expect("client cache poisoned");
        *guard = Some(CachedClient {
            client: client.clone(),
            built_at: Instant::now(),
        });
        Ok(client)
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        let proxy = reqwest::Proxy::all(format!("socks5h://{}", self.proxy_addr))
            .with_context(|| format!("invalid SOCKS5 proxy address {}", self.proxy_addr))?;
        reqwest::Client::builder()
            .proxy(proxy)
            .timeout(CLIENT_TIMEOUT)
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("building proxied HTTP client")
    }

    async fn fetch_impl(&self, url: &str) -> Result<String> {
        let client = self.client()?;

        let resp = client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .header(USER_AGENT, BROWSER_UA)
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            bail!("unexpected status code {status}: {snippet}");
        }

        if let Some(content_type) = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            let is_text = TEXT_CONTENT_PREFIXES
                .iter()
                .any(|p| content_type.starts_with(p));
            if !is_text {
                warn!(url, content_type, "rejecting non-text content type");
                bail!("unsupported content type: {content_type} (only text/html accepted)");
            }
        }

        resp.text()
            .await
            .with_context(|| format!("reading response body from {url}"))
    }
}

#[async_trait]
impl Transport for ProxyTransport {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetch_impl(url).await
    }

    async fn check_readiness(&self) -> ReadinessStatus {
        super::readiness::check(self).await
    }

    async fn check_status(&self) -> NetworkStatus {
        super::status::check(self).await
    }
}

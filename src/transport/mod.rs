// src/transport/mod.rs
//! SOCKS5-routed transport: cached proxy client, raw and retrying fetch,
//! plus two independent health probes (readiness and exit status).

pub mod client;
pub mod readiness;
pub mod status;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

pub use client::ProxyTransport;
pub use readiness::ReadinessStatus;
pub use status::NetworkStatus;

/// Backoff cap for readiness polling.
const WAIT_DELAY_CAP: Duration = Duration::from_secs(15);

/// Seam between the orchestrator and the network. The production
/// implementation is [`ProxyTransport`]; tests substitute deterministic fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Single GET through the proxy. Returns the decoded body text.
    async fn fetch(&self, url: &str) -> Result<String>;

    /// Two-phase probe: SOCKS5 port dial, then a routed test request.
    /// Degrades to a negative status instead of erroring.
    async fn check_readiness(&self) -> ReadinessStatus;

    /// Cached exit-address probe. Degrades to a disconnected status.
    async fn check_status(&self) -> NetworkStatus;

    /// Calls `fetch` up to `max_attempts` times. The error classification
    /// below only tunes log verbosity; the retry happens either way. Before
    /// each retry the proxy readiness is re-checked and the sleep is doubled
    /// when the proxy is not ready.
    async fn fetch_with_retry(
        &self,
        url: &str,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Result<String> {
        let mut last_err = None;

        for attempt in 1..=max_attempts {
            match self.fetch(url).await {
                Ok(body) => {
                    if attempt > 1 {
                        info!(url, attempt, max_attempts, "fetch succeeded after retry");
                    }
                    return Ok(body);
                }
                Err(e) => {
                    if attempt < max_attempts {
                        if is_retryable(&e) {
                            warn!(url, attempt, max_attempts, error = %e, "fetch failed, retrying");
                        } else {
                            info!(url, attempt, max_attempts, error = %e, "non-retryable fetch error, retrying anyway");
                        }
                    }
                    last_err = Some(e);
                }
            }

            if attempt < max_attempts {
                if self.check_readiness().await.is_ready {
                    tokio::time::sleep(base_delay).await;
                } else {
                    warn!(url, "proxy not ready, waiting longer before retry");
                    tokio::time::sleep(base_delay * 2).await;
                }
            }
        }

        let err = last_err.unwrap_or_else(|| anyhow::anyhow!("no attempts made"));
        Err(err.context(format!("failed to fetch after {max_attempts} attempts")))
    }

    /// Polls `check_readiness` with exponential backoff (x1.5, capped at 15s).
    /// A probe failure is just another "not ready" result, never an error;
    /// the only error is exhausting the attempt budget.
    async fn wait_for_ready(&self, max_attempts: u32, initial_delay: Duration) -> Result<()> {
        let mut delay = initial_delay;

        for attempt in 1..=max_attempts {
            let status = self.check_readiness().await;
            if status.is_ready {
                info!(
                    bootstrap_percent = status.bootstrap_percent,
                    "proxy is ready"
                );
                return Ok(());
            }
            info!(
                attempt,
                max_attempts,
                bootstrap_percent = status.bootstrap_percent,
                message = %status.message,
                "proxy not ready yet"
            );

            if attempt < max_attempts {
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(1.5).min(WAIT_DELAY_CAP);
            }
        }

        anyhow::bail!("proxy did not become ready after {max_attempts} attempts")
    }
}

/// Substring classification of transport errors, matched against the full
/// error chain. Controls logging only: every error is retried up to the
/// attempt budget.
pub(crate) fn is_retryable(err: &anyhow::Error) -> bool {
    let text = format!("{err:#}").to_ascii_lowercase();
    ["timeout", "timed out", "connection", "refused", "network", "temporary"]
        .iter()
        .any(|needle| text.contains(needle))
}

/// Splits a `host:port` proxy address, defaulting the port to 9050.
pub(crate) fn split_proxy_addr(addr: &str) -> (String, u16) {
    match addr.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(p) => (host.to_string(), p),
            Err(_) => (addr.to_string(), 9050),
        },
        None => (addr.to_string(), 9050),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification_is_substring_based() {
        assert!(is_retryable(&anyhow::anyhow!("connection refused")));
        assert!(is_retryable(&anyhow::anyhow!("operation timed out")));
        assert!(is_retryable(&anyhow::anyhow!("temporary failure in name resolution")));
        assert!(!is_retryable(&anyhow::anyhow!("unsupported content type: image/png")));
    }

    #[test]
    fn proxy_addr_splits_with_default_port() {
        assert_eq!(split_proxy_addr("tor:9050"), ("tor".to_string(), 9050));
        assert_eq!(split_proxy_addr("127.0.0.1:9150"), ("127.0.0.1".to_string(), 9150));
        assert_eq!(split_proxy_addr("tor"), ("tor".to_string(), 9050));
    }
}

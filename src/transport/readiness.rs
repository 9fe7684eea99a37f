// src/transport/readiness.rs
//! Proxy readiness probe. An open SOCKS5 port is not enough: the anonymizing
//! network bootstraps over time, so the probe also verifies that traffic is
//! actually being routed and infers a bootstrap percentage from the failure
//! mode.

use std::time::Duration;

use reqwest::header::USER_AGENT;
use serde::Serialize;
use tokio::net::TcpStream;

use super::client::ProxyTransport;
use super::split_proxy_addr;

const DIAL_TIMEOUT: Duration = Duration::from_secs(3);
const PROBE_TIMEOUT: Duration = Duration::from_secs(8);
const PROBE_URL: &str = "http://icanhazip.com";

/// Ephemeral, recomputed per call. `bootstrap_percent` is a heuristic
/// inferred from probe failure modes, not a real progress counter.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessStatus {
    pub is_ready: bool,
    pub bootstrap_percent: u8,
    pub message: String,
}

impl ReadinessStatus {
    fn not_ready(bootstrap_percent: u8, message: String) -> Self {
        Self {
            is_ready: false,
            bootstrap_percent,
            message,
        }
    }
}

/// Two-phase probe. Phase 1: plain TCP dial to the SOCKS5 port. Phase 2: a
/// lightweight routed GET. Never errors; every failure maps to a negative
/// status with an estimated bootstrap percentage.
pub(super) async fn check(transport: &ProxyTransport) -> ReadinessStatus {
    let (host, port) = split_proxy_addr(transport.proxy_addr());

    match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            return ReadinessStatus::not_ready(
                0,
                format!("SOCKS5 port unreachable at {host}:{port}: {e}"),
            );
        }
        Err(_) => {
            return ReadinessStatus::not_ready(
                0,
                format!("SOCKS5 port unreachable at {host}:{port}: dial timed out"),
            );
        }
    }

    let client = match transport.client() {
        Ok(c) => c,
        Err(e) => {
            return ReadinessStatus::not_ready(0, format!("failed to create proxied client: {e:#}"));
        }
    };

    let resp = client
        .get(PROBE_URL)
        .timeout(PROBE_TIMEOUT)
        .header(USER_AGENT, "Mozilla/5.0")
        .send()
        .await;

    match resp {
        Err(e) => {
            let text = format!("{e:#}").to_ascii_lowercase();
            let bootstrapping = ["connection refused", "no route", "timeout", "timed out"]
                .iter()
                .any(|needle| text.contains(needle));
            if bootstrapping {
                // Port open but circuits not built yet.
                ReadinessStatus::not_ready(50, format!("proxy bootstrap in progress: {e}"))
            } else {
                ReadinessStatus::not_ready(0, format!("proxy routing test failed: {e}"))
            }
        }
        Ok(resp) if resp.status().as_u16() == 200 => ReadinessStatus {
            is_ready: true,
            bootstrap_percent: 100,
            message: "proxy is ready and routing traffic".to_string(),
        },
        Ok(resp) => ReadinessStatus::not_ready(
            75,
            format!("proxy responded but with status {}", resp.status().as_u16()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;

    // Port 9 on localhost is the discard port; nothing listens there in CI,
    // so the dial fails fast and phase 2 is never reached.
    #[tokio::test]
    async fn unreachable_socks_port_reports_zero_bootstrap() {
        let transport = ProxyTransport::new("127.0.0.1:9");
        let status = transport.check_readiness().await;
        assert!(!status.is_ready);
        assert_eq!(status.bootstrap_percent, 0);
        assert!(status.message.contains("SOCKS5 port unreachable"));
    }
}

// src/transport/status.rs
//! Exit-address probe. Races several external IP-echo services through the
//! proxy and reports the first syntactically valid address. Cached with a
//! short TTL while disconnected so a flapping proxy is re-checked quickly,
//! and a longer TTL while connected to avoid hammering the echo services.

use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::client::{ProxyTransport, BROWSER_UA};
use super::split_proxy_addr;

const TTL_DISCONNECTED: Duration = Duration::from_secs(1);
const TTL_CONNECTED: Duration = Duration::from_secs(15);
const DIAL_TIMEOUT: Duration = Duration::from_secs(1);
const RACE_DEADLINE: Duration = Duration::from_secs(10);

const PLAIN_ENDPOINTS: [&str; 7] = [
    "http://icanhazip.com",
    "http://ifconfig.me/ip",
    "http://ipinfo.io/ip",
    "http://api.ipify.org",
    "http://checkip.amazonaws.com",
    "http://ipecho.net/plain",
    "http://ident.me",
];

const JSON_ENDPOINTS: [(&str, &str); 3] = [
    ("http://api.ipify.org?format=json", "ip"),
    ("https://api.ipify.org?format=json", "ip"),
    ("https://check.torproject.org/api/ip", "IP"),
];

#[derive(Debug, Clone, Serialize)]
pub struct NetworkStatus {
    pub is_connected: bool,
    pub exit_address: Option<String>,
    pub message: String,
}

pub(super) struct StatusCache {
    inner: RwLock<Option<(NetworkStatus, Instant)>>,
}

impl StatusCache {
    pub(super) fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    fn get(&self) -> Option<NetworkStatus> {
        let guard = self.inner.read().expect("status cache poisoned");
        let (status, at) = guard.as_ref()?;
        let ttl = if status.is_connected {
            TTL_CONNECTED
        } else {
            TTL_DISCONNECTED
        };
        (at.elapsed() < ttl).then(|| status.clone())
    }

    fn put(&self, status: &NetworkStatus) {
        let mut guard = self.inner.write().expect("status cache poisoned");
        *guard = Some((status.clone(), Instant::now()));
    }
}

pub(super) async fn check(transport: &ProxyTransport) -> NetworkStatus {
    if let Some(cached) = transport.status_cache.get() {
        return cached;
    }

    let status = refresh(transport).await;
    transport.status_cache.put(&status);
    status
}

async fn refresh(transport: &ProxyTransport) -> NetworkStatus {
    let proxy_addr = transport.proxy_addr().to_string();
    let (host, port) = split_proxy_addr(&proxy_addr);

    // Cheap gate: no point racing echo services when the port is closed.
    let dial = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect((host.as_str(), port))).await;
    let dial_err = match dial {
        Ok(Ok(_)) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some("dial timed out".to_string()),
    };
    if let Some(e) = dial_err {
        return NetworkStatus {
            is_connected: false,
            exit_address: None,
            message: format!("SOCKS5 port unreachable at {host}:{port}: {e}"),
        };
    }

    let client = match transport.client() {
        Ok(c) => c,
        Err(_) => {
            return NetworkStatus {
                is_connected: false,
                exit_address: None,
                message: format!(
                    "proxy connection failed ({proxy_addr}); make sure the proxy is running"
                ),
            };
        }
    };

    // Single-slot result channel: the first valid address wins, every other
    // in-flight request is abandoned when this function returns.
    let (tx, mut rx) = mpsc::channel::<String>(1);
    let last_error: std::sync::Arc<Mutex<Option<String>>> =
        std::sync::Arc::new(Mutex::new(None));

    for url in PLAIN_ENDPOINTS {
        tokio::spawn(fetch_plain(
            client.clone(),
            url,
            tx.clone(),
            last_error.clone(),
        ));
    }
    for (url, field) in JSON_ENDPOINTS {
        tokio::spawn(fetch_json(
            client.clone(),
            url,
            field,
            tx.clone(),
            last_error.clone(),
        ));
    }
    drop(tx);

    let exit_address = match tokio::time::timeout(RACE_DEADLINE, rx.recv()).await {
        Ok(Some(addr)) => {
            info!(exit_address = %addr, "retrieved proxy exit address");
            Some(addr)
        }
        Ok(None) | Err(_) => {
            let last = last_error.lock().expect("last error poisoned").clone();
            warn!(last_error = ?last, "no exit address received from any echo service");
            None
        }
    };

    match exit_address {
        Some(addr) => NetworkStatus {
            is_connected: true,
            exit_address: Some(addr),
            message: "proxy connection active".to_string(),
        },
        None => {
            let last = last_error.lock().expect("last error poisoned").clone();
            let message = match last {
                Some(e) => {
                    format!("proxy connected but address check failed: {e}. Proxy: {proxy_addr}")
                }
                None => format!(
                    "proxy active but unable to retrieve exit address. Proxy: {proxy_addr}"
                ),
            };
            NetworkStatus {
                is_connected: false,
                exit_address: None,
                message,
            }
        }
    }
}

async fn fetch_plain(
    client: reqwest::Client,
    url: &'static str,
    tx: mpsc::Sender<String>,
    last_error: std::sync::Arc<Mutex<Option<String>>>,
) {
    let resp = client
        .get(url)
        .timeout(RACE_DEADLINE)
        .header(USER_AGENT, BROWSER_UA)
        .header(ACCEPT, "*/*")
        .send()
        .await;
    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            record_error(&last_error, e);
            return;
        }
    };
    if resp.status().as_u16() != 200 {
        return;
    }
    let Ok(body) = resp.text().await else { return };
    let candidate: String = body.chars().take(50).collect();
    if let Some(ip) = validate_ip(&candidate) {
        let _ = tx.try_send(ip);
    }
}

async fn fetch_json(
    client: reqwest::Client,
    url: &'static str,
    field: &'static str,
    tx: mpsc::Sender<String>,
    last_error: std::sync::Arc<Mutex<Option<String>>>,
) {
    let resp = client
        .get(url)
        .timeout(RACE_DEADLINE)
        .header(USER_AGENT, BROWSER_UA)
        .header(ACCEPT, "application/json")
        .send()
        .await;
    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            record_error(&last_error, e);
            return;
        }
    };
    if resp.status().as_u16() != 200 {
        return;
    }
    let Ok(value) = resp.json::<serde_json::Value>().await else {
        return;
    };

    for key in [field, "ip", "IP", "origin", "Origin", "query", "Query"] {
        if let Some(raw) = value.get(key).and_then(|v| v.as_str()) {
            if let Some(ip) = validate_ip(raw) {
                let _ = tx.try_send(ip);
                return;
            }
        }
    }
}

// Last writer wins; the reported message carries the most recent failure.
fn record_error(slot: &Mutex<Option<String>>, err: impl std::fmt::Display) {
    let mut guard = slot.lock().expect("last error poisoned");
    *guard = Some(err.to_string());
}

/// Strict validation of an echoed address: dotted-quad digit/length checks
/// for IPv4, a minimal sanity check for IPv6. Returns the cleaned literal.
fn validate_ip(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '"' | '\''))
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        return None;
    }

    if cleaned.contains('.') {
        let parts: Vec<&str> = cleaned.split('.').collect();
        if parts.len() == 4
            && parts
                .iter()
                .all(|p| (1..=3).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_digit()))
        {
            return Some(cleaned);
        }
        return None;
    }
    if cleaned.contains(':') && cleaned.len() > 2 {
        return Some(cleaned);
    }
    None
}

// src/analyzer.rs
//! Optional external annotation service. Invoked after an entry is stored;
//! its latency or failure must never affect a scrape's outcome, so the
//! disabled state is a quiet no-op and callers dispatch fire-and-forget.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Returns `Ok(None)` when disabled or when the service produced no
    /// analysis; both are normal outcomes, not errors.
    async fn analyze(
        &self,
        title: &str,
        content: &str,
        category: &str,
        criticality_score: u8,
    ) -> Result<Option<String>>;

    fn is_enabled(&self) -> bool;
}

#[derive(Serialize)]
struct AnalysisRequest<'a> {
    title: &'a str,
    content: &'a str,
    category: &'a str,
    criticality_score: u8,
}

#[derive(Deserialize)]
struct AnalysisResponse {
    #[serde(default)]
    analysis: String,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the annotation service. Calls go out directly, not
/// through the anonymizing proxy.
pub struct HttpAnalyzer {
    base_url: String,
    http: reqwest::Client,
}

impl HttpAnalyzer {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building analyzer HTTP client")?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(
        &self,
        title: &str,
        content: &str,
        category: &str,
        criticality_score: u8,
    ) -> Result<Option<String>> {
        let req = AnalysisRequest {
            title,
            content,
            category,
            criticality_score,
        };

        let resp = self
            .http
            .post(format!("{}/analyze", self.base_url.trim_end_matches('/')))
            .json(&req)
            .send()
            .await
            .context("analyzer request failed")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("analyzer returned status {status}");
        }

        let body: AnalysisResponse = resp.json().await.context("decoding analyzer response")?;
        if let Some(err) = body.error.filter(|e| !e.is_empty()) {
            bail!("analyzer error: {err}");
        }
        if body.analysis.is_empty() {
            return Ok(None);
        }
        Ok(Some(body.analysis))
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Used when no analyzer endpoint is configured.
pub struct DisabledAnalyzer;

#[async_trait]
impl Analyzer for DisabledAnalyzer {
    async fn analyze(&self, _: &str, _: &str, _: &str, _: u8) -> Result<Option<String>> {
        Ok(None)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Builds the HTTP analyzer when an endpoint is configured, else disabled.
pub fn build_analyzer(config: &Config) -> Arc<dyn Analyzer> {
    match config.analyzer_url.as_deref() {
        Some(url) if !url.is_empty() => match HttpAnalyzer::new(url) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::warn!(error = %e, "failed to build analyzer client, disabling");
                Arc::new(DisabledAnalyzer)
            }
        },
        _ => Arc::new(DisabledAnalyzer),
    }
}

// tests/api_http.rs
// Router-level tests driven through tower's oneshot, with a deterministic
// transport behind the engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use threat_intel_scraper::api::{create_router, ApiState};
use threat_intel_scraper::scraper::ScrapePolicy;
use threat_intel_scraper::transport::{NetworkStatus, ReadinessStatus, Transport};
use threat_intel_scraper::{DisabledAnalyzer, MemoryStore, ScrapeQueue, Scraper, StateStore};

struct StaticTransport;

#[async_trait]
impl Transport for StaticTransport {
    async fn fetch(&self, _url: &str) -> Result<String> {
        Ok("<html><title>t</title><body>quiet</body></html>".into())
    }

    async fn check_readiness(&self) -> ReadinessStatus {
        ReadinessStatus {
            is_ready: true,
            bootstrap_percent: 100,
            message: "Tor is ready".into(),
        }
    }

    async fn check_status(&self) -> NetworkStatus {
        NetworkStatus {
            is_connected: true,
            exit_address: Some("185.220.101.4".into()),
            message: "Connected via exit 185.220.101.4".into(),
        }
    }
}

fn test_app() -> (Router, Arc<Scraper>) {
    let store = Arc::new(MemoryStore::new());
    store.add_source("forum", "http://forum.example.onion");
    let scraper = Arc::new(Scraper::new(
        store,
        Arc::new(StaticTransport),
        Arc::new(StateStore::new()),
        Arc::new(DisabledAnalyzer),
        ScrapePolicy {
            source_pause: Duration::from_millis(1),
            ..ScrapePolicy::default()
        },
    ));
    let queue = ScrapeQueue::start(scraper.clone(), 8, 1);
    let router = create_router(ApiState {
        scraper: scraper.clone(),
        queue,
    });
    (router, scraper)
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = test_app();
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn status_snapshot_has_active_and_recent() {
    let (app, scraper) = test_app();
    scraper.scrape_source(1).await;

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/scraper/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["active"].as_array().unwrap().len(), 0);
    let recent = json["recent"].as_array().unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["source_id"], 1);
    assert_eq!(recent[0]["status"], "completed");
}

#[tokio::test]
async fn status_by_unknown_id_is_404() {
    let (app, _) = test_app();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/scraper/status/42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn trigger_is_accepted_and_queued() {
    let (app, _) = test_app();
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/scraper/trigger/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "queued");
}

#[tokio::test]
async fn tor_probes_report_transport_health() {
    let (app, _) = test_app();
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/tor/readiness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["is_ready"], true);
    assert_eq!(json["bootstrap_percent"], 100);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/tor/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["is_connected"], true);
    assert_eq!(json["exit_address"], "185.220.101.4");
}

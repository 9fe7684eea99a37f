// src/api.rs
//! Thin HTTP surface over the scrape engine: status snapshots, trigger
//! endpoints, and proxy health probes. Glue only: no auth, no data CRUD.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::scraper::{ScrapeQueue, Scraper};
use crate::state::ScrapeState;
use crate::transport::{NetworkStatus, ReadinessStatus};

const RECENT_LIMIT: usize = 20;

#[derive(Clone)]
pub struct ApiState {
    pub scraper: Arc<Scraper>,
    pub queue: ScrapeQueue,
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/scraper/status", get(scraper_status))
        .route("/api/scraper/status/{id}", get(scraper_status_by_id))
        .route("/api/scraper/trigger", post(trigger_all))
        .route("/api/scraper/trigger/{id}", post(trigger_source))
        .route("/api/tor/status", get(tor_status))
        .route("/api/tor/readiness", get(tor_readiness))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct ScraperStatusResponse {
    active: Vec<ScrapeState>,
    recent: Vec<ScrapeState>,
}

async fn scraper_status(State(state): State<ApiState>) -> Json<ScraperStatusResponse> {
    Json(ScraperStatusResponse {
        active: state.scraper.active_scrapes(),
        recent: state.scraper.recent_scrapes(RECENT_LIMIT),
    })
}

async fn scraper_status_by_id(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<ScrapeState>, StatusCode> {
    state
        .scraper
        .scrape_state(id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(serde::Serialize)]
struct TriggerResponse {
    status: &'static str,
}

async fn trigger_all(State(state): State<ApiState>) -> (StatusCode, Json<TriggerResponse>) {
    match state.queue.trigger_all() {
        Ok(()) => (StatusCode::ACCEPTED, Json(TriggerResponse { status: "queued" })),
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(TriggerResponse { status: "queue full" }),
        ),
    }
}

async fn trigger_source(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> (StatusCode, Json<TriggerResponse>) {
    match state.queue.trigger_source(id) {
        Ok(()) => (StatusCode::ACCEPTED, Json(TriggerResponse { status: "queued" })),
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(TriggerResponse { status: "queue full" }),
        ),
    }
}

async fn tor_status(State(state): State<ApiState>) -> Json<NetworkStatus> {
    Json(state.scraper.transport().check_status().await)
}

async fn tor_readiness(State(state): State<ApiState>) -> Json<ReadinessStatus> {
    Json(state.scraper.transport().check_readiness().await)
}

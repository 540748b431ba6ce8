//! Liveness and publish counters.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::api::server::AppState;
use crate::publish::PublishStatsSnapshot;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub live_channels: usize,
    pub active_jobs: usize,
    pub encoder: &'static str,
    pub publish_enabled: bool,
    pub publish_store: &'static str,
    pub publish: PublishStatsSnapshot,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        live_channels: state.channels.len(),
        active_jobs: state.orchestrator.active_jobs(),
        encoder: state.orchestrator.engine_name(),
        publish_enabled: state.publisher.is_enabled(),
        publish_store: state.publisher.store_name(),
        publish: state.publisher.stats(),
    })
}

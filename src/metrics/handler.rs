//! Axum handler for `GET /metrics`.

use crate::api::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

/// Prometheus text exposition. Always 200, even before anything was recorded.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let converter_available = state
        .orchestrator
        .probe_cache()
        .last_record()
        .await
        .map(|r| r.available)
        .unwrap_or(false);
    state.metrics_collector.update_gauges(
        state.orchestrator.cache_len(),
        state.orchestrator.store().len(),
        converter_available,
    );

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics_collector.render_metrics(),
    )
}

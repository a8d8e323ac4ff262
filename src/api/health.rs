//! Health check endpoint handler.

use crate::api::AppState;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub cache_entries: usize,
    /// Last probe result; `null` until the converter has been probed
    pub converter_available: Option<bool>,
}

/// GET /health
///
/// Reports the last known converter state without triggering a probe.
/// A missing converter only degrades previews, so it reports `degraded`.
pub async fn handle(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let converter_available = state
        .orchestrator
        .probe_cache()
        .last_record()
        .await
        .map(|record| record.available);

    let status = match converter_available {
        Some(false) => "degraded",
        _ => "ok",
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cache_entries: state.orchestrator.cache_len(),
        converter_available,
    })
}

//! `POST /api/generate`

use super::{ApiError, AppState, GenerateRequest, GenerateResponse};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

pub async fn handle(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| {
        tracing::debug!(error = %e, "Rejected generate payload");
        ApiError::bad_request("Request body must be JSON of the form {\"prompt\": \"...\"}.")
    })?;

    let outcome = state.orchestrator.generate(&request.prompt).await.map_err(|e| {
        let err = ApiError::from(e);
        tracing::info!(status = err.status.as_u16(), code = err.info.code(), "Generation failed");
        err
    })?;

    Ok(Json(GenerateResponse::success(&outcome)))
}

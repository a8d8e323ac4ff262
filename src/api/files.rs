//! `GET /api/files/:id`

use super::{ApiError, AppState};
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Browser cache lifetime for served artifacts.
pub const FILE_CACHE_CONTROL: &str = "public, max-age=3600";

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (file, bytes) = state.orchestrator.store().read(&id).await?;

    let disposition = format!("inline; filename=\"{}\"", file.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.clone()),
            (header::CACHE_CONTROL, FILE_CACHE_CONTROL.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

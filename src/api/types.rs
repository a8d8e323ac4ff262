//! Request and response types for the generation API.

use crate::classify::{classify, ErrorInfo};
use crate::orchestrator::{GenerateError, GenerationOutcome};
use crate::storage::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

/// Prefix under which stored artifacts are served.
pub const FILES_ROUTE_PREFIX: &str = "/api/files";

/// POST /api/generate request body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

/// Outcome marker in [`GenerateResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Uniform response body for the generation endpoint and for every error
/// the server emits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
    /// Classified failure, present on errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl GenerateResponse {
    pub fn success(outcome: &GenerationOutcome) -> Self {
        let artifact = &outcome.artifact;
        Self {
            status: ResponseStatus::Success,
            message: outcome.warning.clone(),
            download_url: Some(file_url(&artifact.document_id)),
            image_url: artifact.preview_id.as_deref().map(file_url),
            code: None,
            cached: outcome.cached,
            error: None,
        }
    }

    pub fn error(info: &ErrorInfo) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(info.message.clone()),
            download_url: None,
            image_url: None,
            code: Some(info.code().to_string()),
            cached: false,
            error: Some(info.clone()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Public URL of a stored artifact.
pub fn file_url(id: &str) -> String {
    format!("{}/{}", FILES_ROUTE_PREFIX, id)
}

/// Error returned by API handlers: an HTTP status plus a classified body.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub info: ErrorInfo,
}

impl ApiError {
    pub fn new(status: StatusCode, info: ErrorInfo) -> Self {
        Self { status, info }
    }

    /// Classify purely from the status code, with a custom message.
    pub fn from_status(status: StatusCode, message: &str) -> Self {
        let mut info = classify("", Some(status.as_u16()));
        info.message = message.to_string();
        Self { status, info }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::from_status(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::from_status(StatusCode::NOT_FOUND, message)
    }

    pub fn gone(message: &str) -> Self {
        Self::from_status(StatusCode::GONE, message)
    }

    pub fn internal(message: &str) -> Self {
        Self::from_status(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.info())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::not_found(&format!("File '{}' not found", id)),
            StoreError::Expired(id) => Self::gone(&format!("File '{}' has expired", id)),
            StoreError::Io(e) => {
                tracing::error!(error = %e, "Artifact storage I/O failure");
                Self::internal("The file could not be read")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(GenerateResponse::error(&self.info))).into_response()
    }
}

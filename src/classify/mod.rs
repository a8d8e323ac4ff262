//! Error classification.
//!
//! Maps raw failures (an error message, an HTTP status, or both) to an
//! [`ErrorInfo`] so every caller-facing surface sees the same shape.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. network-layer fault in the message → `network`, retryable
//! 2. deadline expiry in the message → `timeout`, retryable
//! 3. status ≥ 500 → `server`, retryable
//! 4. status in 400..500 → `client`, retryable, with a kind-specific action
//! 5. anything else → `unknown`, not retryable

mod info;

pub use info::*;

use std::time::Duration;

/// Backoff suggested for 429 responses without a usable `Retry-After`.
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

const NETWORK_SIGNATURES: &[&str] = &[
    "network",
    "fetch",
    "connection refused",
    "connection reset",
    "connection closed",
    "dns",
    "econnrefused",
    "econnreset",
    "enotfound",
    "error sending request",
];

const TIMEOUT_SIGNATURES: &[&str] = &["timeout", "timed out", "deadline", "aborterror"];

/// Classify a failure from its message and an optional HTTP status.
pub fn classify(failure_message: &str, status: Option<u16>) -> ErrorInfo {
    let lowered = failure_message.to_lowercase();

    if NETWORK_SIGNATURES.iter().any(|sig| lowered.contains(sig)) {
        return ErrorInfo::new(
            ErrorCategory::Network,
            "Unable to reach the server. Check your connection.",
            true,
        )
        .with_action(ACTION_CHECK_CONNECTION);
    }

    if TIMEOUT_SIGNATURES.iter().any(|sig| lowered.contains(sig)) {
        return ErrorInfo::new(
            ErrorCategory::Timeout,
            "The request took too long to complete.",
            true,
        )
        .with_action(ACTION_WAIT_AND_RETRY);
    }

    match status {
        Some(code) if code >= 500 => ErrorInfo::new(
            ErrorCategory::Server,
            message_or_default(failure_message, code),
            true,
        )
        .with_action(ACTION_WAIT_AND_RETRY),
        Some(code) if (400..500).contains(&code) => {
            let kind = ClientErrorKind::from_status(code);
            let info = ErrorInfo::new(
                ErrorCategory::Client,
                message_or_default(failure_message, code),
                true,
            )
            .with_action(kind.user_action())
            .with_client_kind(kind);
            if kind == ClientErrorKind::RateLimited {
                info.with_retry_after(DEFAULT_RATE_LIMIT_BACKOFF)
            } else {
                info
            }
        }
        _ => {
            let message = if failure_message.trim().is_empty() {
                "An unexpected error occurred.".to_string()
            } else {
                failure_message.to_string()
            };
            ErrorInfo::new(ErrorCategory::Unknown, message, false)
        }
    }
}

/// Classify an HTTP error response, extracting a user message from its body.
///
/// Recognised payloads are `{"message": ..}`, `{"error": ".."}` and
/// `{"error": {"message": ..}}`. Anything else falls back to
/// [`message_for_status`].
pub fn classify_status(status: u16, body: &str) -> ErrorInfo {
    let message = extract_message(body).unwrap_or_else(|| message_for_status(status).to_string());
    let mut info = match status {
        code if code >= 400 => classify_http(&message, code),
        _ => classify(&message, Some(status)),
    };
    if status == 429 {
        if let Some(secs) = extract_retry_after(body) {
            info = info.with_retry_after(Duration::from_secs(secs));
        }
    }
    info
}

/// Classify a reqwest transport failure.
pub fn classify_reqwest(err: &reqwest::Error) -> ErrorInfo {
    if err.is_timeout() {
        return classify("request timed out", None);
    }
    if err.is_connect() || err.is_request() {
        return classify(&format!("network error: {}", err), None);
    }
    let status = err.status().map(|s| s.as_u16());
    classify(&err.to_string(), status)
}

/// Generic user message for an HTTP status.
pub fn message_for_status(status: u16) -> &'static str {
    match status {
        400 => "The request was malformed.",
        401 => "Authentication is required or the credentials are invalid.",
        402 => "The generation quota or billing limit has been reached.",
        403 => "Access to this resource is forbidden.",
        404 => "The requested resource was not found.",
        408 => "The request took too long to complete.",
        410 => "The requested resource has expired.",
        413 => "The request is too large.",
        422 => "The prompt could not be processed. Try rephrasing it.",
        429 => "Too many requests. Please wait before trying again.",
        500 => "The server encountered an internal error.",
        502 => "The upstream service returned an invalid response.",
        503 => "The service is temporarily unavailable.",
        504 => "The upstream service did not respond in time.",
        s if s >= 500 => "The server failed to handle the request.",
        s if s >= 400 => "The request could not be completed.",
        _ => "An unexpected error occurred.",
    }
}

/// Status-driven classification that skips the message signature rules.
///
/// Server-provided messages routinely contain words like "timeout" that must
/// not override the status the server chose.
fn classify_http(message: &str, status: u16) -> ErrorInfo {
    let mut info = classify("", Some(status));
    info.message = message.to_string();
    info
}

fn message_or_default(message: &str, status: u16) -> String {
    if message.trim().is_empty() {
        message_for_status(status).to_string()
    } else {
        message.to_string()
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidate = value
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| match value.get("error") {
            Some(serde_json::Value::String(s)) => Some(s.as_str()),
            Some(obj) => obj.get("message").and_then(|m| m.as_str()),
            None => None,
        })?;
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("retryAfter")
        .or_else(|| value.get("retry_after"))
        .and_then(|v| v.as_u64())
}

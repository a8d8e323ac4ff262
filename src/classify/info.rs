//! Error taxonomy shared by the server and the client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User action attached to failures that resolve after waiting.
pub const ACTION_WAIT_AND_RETRY: &str = "wait and retry";
/// User action attached to failures caused by the submitted input.
pub const ACTION_REVISE_INPUT: &str = "revise input";
/// User action attached to quota or billing failures.
pub const ACTION_CHECK_BILLING: &str = "check billing or quota";
/// User action attached to authentication failures.
pub const ACTION_CHECK_CREDENTIALS: &str = "check credentials";
/// User action attached to connectivity failures.
pub const ACTION_CHECK_CONNECTION: &str = "check your connection and retry";

/// Coarse failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Network,
    Timeout,
    Server,
    Client,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Server => "server",
            ErrorCategory::Client => "client",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-classification of [`ErrorCategory::Client`] failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorKind {
    /// 400, 413, 422: the input has to change before a retry can succeed
    BadInput,
    /// 429
    RateLimited,
    /// 402
    Quota,
    /// 401, 403
    Unauthorized,
    Other,
}

impl ClientErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 413 | 422 => ClientErrorKind::BadInput,
            429 => ClientErrorKind::RateLimited,
            402 => ClientErrorKind::Quota,
            401 | 403 => ClientErrorKind::Unauthorized,
            _ => ClientErrorKind::Other,
        }
    }

    /// Action suggested to the user for this kind of client failure.
    pub fn user_action(&self) -> &'static str {
        match self {
            ClientErrorKind::BadInput => ACTION_REVISE_INPUT,
            ClientErrorKind::RateLimited | ClientErrorKind::Other => ACTION_WAIT_AND_RETRY,
            ClientErrorKind::Quota => ACTION_CHECK_BILLING,
            ClientErrorKind::Unauthorized => ACTION_CHECK_CREDENTIALS,
        }
    }
}

/// Classified failure, built once per failure and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub message: String,
    pub category: ErrorCategory,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_kind: Option<ClientErrorKind>,
    /// Suggested backoff before the next attempt
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "duration_secs",
        default
    )]
    pub retry_after: Option<Duration>,
}

impl ErrorInfo {
    pub fn new(category: ErrorCategory, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            category,
            retryable,
            user_action: None,
            client_kind: None,
            retry_after: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.user_action = Some(action.into());
        self
    }

    pub fn with_client_kind(mut self, kind: ClientErrorKind) -> Self {
        self.client_kind = Some(kind);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// True when retrying the same input cannot help until the input changes.
    pub fn should_revise_input(&self) -> bool {
        self.client_kind == Some(ClientErrorKind::BadInput)
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match (self.category, self.client_kind) {
            (ErrorCategory::Client, Some(ClientErrorKind::BadInput)) => "invalid_input",
            (ErrorCategory::Client, Some(ClientErrorKind::RateLimited)) => "rate_limited",
            (ErrorCategory::Client, Some(ClientErrorKind::Quota)) => "quota_exceeded",
            (ErrorCategory::Client, Some(ClientErrorKind::Unauthorized)) => "unauthorized",
            (ErrorCategory::Client, _) => "client_error",
            (ErrorCategory::Network, _) => "network_error",
            (ErrorCategory::Timeout, _) => "timeout",
            (ErrorCategory::Server, _) => "server_error",
            (ErrorCategory::Unknown, _) => "unknown_error",
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

//! Single network call with a deadline.

use crate::classify::{classify, ErrorInfo};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Request description handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl FetchOptions {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// POST with a JSON body.
    pub fn post_json<T: Serialize>(payload: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(payload)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        Ok(Self {
            method: Method::POST,
            headers,
            body: Some(body),
        })
    }
}

/// Fully buffered response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// `Retry-After` in whole seconds, if present and numeric.
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(reqwest::header::RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

/// Transport-level failures.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The peer could not be reached.
    #[error("network error: {0}")]
    Connect(String),

    /// The request could not be built or sent for a non-network reason.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be read.
    #[error("network error while reading body: {0}")]
    Body(String),
}

/// Sends one request. Implementations must be cancellation-safe: dropping
/// the future abandons the request.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, target: &str, options: &FetchOptions)
        -> Result<FetchResponse, TransportError>;
}

/// reqwest-backed [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        target: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse, TransportError> {
        let mut request = self
            .client
            .request(options.method.clone(), target)
            .headers(options.headers.clone());
        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_request() {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::Request(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(FetchResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Failure of a [`ResilientFetch::call`].
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FetchError {
    /// Classified view of this failure.
    pub fn info(&self) -> ErrorInfo {
        classify(&self.to_string(), None)
    }
}

/// Races a transport call against a deadline.
#[derive(Clone)]
pub struct ResilientFetch {
    transport: Arc<dyn Transport>,
}

impl ResilientFetch {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send one request. When `deadline` elapses first the in-flight request
    /// is dropped and [`FetchError::Timeout`] is returned; otherwise the
    /// timer is discarded with the future and never fires.
    pub async fn call(
        &self,
        target: &str,
        options: &FetchOptions,
        deadline: Duration,
    ) -> Result<FetchResponse, FetchError> {
        match tokio::time::timeout(deadline, self.transport.send(target, options)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::debug!(url = target, deadline_ms = deadline.as_millis() as u64, "Request deadline elapsed");
                Err(FetchError::Timeout { after: deadline })
            }
        }
    }
}

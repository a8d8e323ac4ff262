//! Client side of the generation API.
//!
//! [`GenerateClient`] composes the pieces below it: the connection monitor
//! picks the per-attempt deadline, the dispatcher retries server errors and
//! network faults, and every failure is classified into an [`ErrorInfo`].

pub mod connection;
pub mod dispatcher;
pub mod fetch;

pub use connection::{
    recommended_timeout, ConnectionQualityMonitor, ConnectionState, ConnectivityEvent,
    ConnectivitySource, NetworkQuality, Subscription,
};
pub use dispatcher::{RetryPolicy, RetryingDispatcher};
pub use fetch::{
    FetchError, FetchOptions, FetchResponse, HttpTransport, ResilientFetch, Transport,
    TransportError,
};

use crate::api::{GenerateRequest, GenerateResponse};
use crate::classify::{classify, classify_status, ErrorInfo};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Path of the generation endpoint, relative to the server base URL.
pub const GENERATE_PATH: &str = "/api/generate";

/// Submits prompts to a flowsmith server.
pub struct GenerateClient {
    base_url: String,
    dispatcher: RetryingDispatcher,
    monitor: ConnectionQualityMonitor,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
    min_deadline: Duration,
    last_failed_prompt: Mutex<Option<String>>,
}

impl GenerateClient {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        monitor: ConnectionQualityMonitor,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dispatcher: RetryingDispatcher::new(ResilientFetch::new(transport)),
            monitor,
            max_retries: dispatcher::DEFAULT_MAX_RETRIES,
            base_delay: dispatcher::DEFAULT_BASE_DELAY,
            max_delay: None,
            min_deadline: Duration::ZERO,
            last_failed_prompt: Mutex::new(None),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration, max_delay: Option<Duration>) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Never give an attempt less than `min_deadline`, whatever the link
    /// quality recommends.
    pub fn with_min_deadline(mut self, min_deadline: Duration) -> Self {
        self.min_deadline = min_deadline;
        self
    }

    /// Retry policy for the next request, with the deadline the current
    /// link quality recommends, raised to the configured minimum.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.monitor.recommended_timeout().max(self.min_deadline))
            .with_max_retries(self.max_retries)
            .with_base_delay(self.base_delay)
            .with_max_delay(self.max_delay)
    }

    /// Generate a diagram for `prompt`.
    ///
    /// A retryable failure remembers the prompt for [`Self::retry_last`].
    pub async fn generate(&self, prompt: &str) -> Result<GenerateResponse, ErrorInfo> {
        let result = self.submit(prompt).await;
        let mut last = self
            .last_failed_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match &result {
            Err(info) if info.retryable => *last = Some(prompt.to_string()),
            _ => *last = None,
        }
        result
    }

    /// Resubmit the last prompt that failed with a retryable error.
    pub async fn retry_last(&self) -> Option<Result<GenerateResponse, ErrorInfo>> {
        let prompt = self
            .last_failed_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()?;
        Some(self.generate(&prompt).await)
    }

    /// Prompt that [`Self::retry_last`] would resubmit.
    pub fn pending_retry(&self) -> Option<String> {
        self.last_failed_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn connection(&self) -> &ConnectionQualityMonitor {
        &self.monitor
    }

    async fn submit(&self, prompt: &str) -> Result<GenerateResponse, ErrorInfo> {
        if !self.monitor.is_online() {
            return Err(classify("network offline", None));
        }

        let options = FetchOptions::post_json(&GenerateRequest {
            prompt: prompt.to_string(),
        })
        .map_err(|e| classify(&e.to_string(), None))?;
        let url = format!("{}{}", self.base_url, GENERATE_PATH);
        let policy = self.policy();

        tracing::debug!(%url, deadline_secs = policy.deadline.as_secs(), "Submitting prompt");
        let response = self
            .dispatcher
            .dispatch(&url, &options, &policy)
            .await
            .map_err(|e| e.info())?;

        if !response.is_success() {
            let mut info = classify_status(response.status, &response.text());
            if let Some(retry_after) = response.retry_after() {
                info = info.with_retry_after(retry_after);
            }
            return Err(info);
        }

        let body: GenerateResponse = response.json().map_err(|e| {
            let mut info = classify("", Some(502));
            info.message = format!("The server returned an unreadable response: {}", e);
            info
        })?;
        match body.error {
            Some(info) if !body.is_success() => Err(info),
            _ => Ok(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClientErrorKind, ErrorCategory};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CannedTransport {
        status: u16,
        body: String,
        calls: AtomicU32,
    }

    impl CannedTransport {
        fn new(status: u16, body: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                status,
                body: body.to_string(),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn send(
            &self,
            _target: &str,
            _options: &FetchOptions,
        ) -> Result<FetchResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchResponse::new(self.status, self.body.clone()))
        }
    }

    fn client(transport: Arc<CannedTransport>, online: bool) -> (GenerateClient, Subscription) {
        let source = ConnectivitySource::new();
        let (monitor, sub) = ConnectionQualityMonitor::start(&source, online, "4g");
        let client = GenerateClient::new("http://localhost:3000/", transport, monitor)
            .with_retries(1, Duration::from_millis(10), None);
        (client, sub)
    }

    #[tokio::test]
    async fn test_offline_refuses_without_sending() {
        let transport = CannedTransport::new(200, serde_json::json!({}));
        let (client, _sub) = client(transport.clone(), false);
        let err = client.generate("draw a login flow").await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Network);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.pending_retry().as_deref(), Some("draw a login flow"));
    }

    #[tokio::test]
    async fn test_success_decodes_response() {
        let transport = CannedTransport::new(
            200,
            serde_json::json!({"status": "success", "downloadUrl": "/api/files/a"}),
        );
        let (client, _sub) = client(transport, true);
        let response = client.generate("draw a login flow").await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.download_url.as_deref(), Some("/api/files/a"));
        assert!(client.pending_retry().is_none());
    }

    #[tokio::test]
    async fn test_bad_input_asks_for_revision() {
        let transport = CannedTransport::new(
            422,
            serde_json::json!({"status": "error", "message": "Prompt is empty"}),
        );
        let (client, _sub) = client(transport.clone(), true);
        let err = client.generate(" ").await.unwrap_err();
        assert_eq!(err.client_kind, Some(ClientErrorKind::BadInput));
        assert_eq!(err.message, "Prompt is empty");
        assert!(err.should_revise_input());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_is_retried_then_remembered() {
        let transport = CannedTransport::new(503, serde_json::json!({"message": "overloaded"}));
        let (client, _sub) = client(transport.clone(), true);
        let err = client.generate("draw a login flow").await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Server);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

        let retried = client.retry_last().await.unwrap();
        assert!(retried.is_err());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_min_deadline_raises_recommended_timeout() {
        let transport = CannedTransport::new(200, serde_json::json!({}));
        let (client, _sub) = client(transport, true);
        assert_eq!(client.policy().deadline, Duration::from_secs(30));

        let client = client.with_min_deadline(Duration::from_secs(200));
        assert_eq!(client.policy().deadline, Duration::from_secs(200));
        assert_eq!(client.policy().max_retries, 1);
    }

    #[tokio::test]
    async fn test_retry_last_without_failure_is_none() {
        let transport = CannedTransport::new(200, serde_json::json!({"status": "success"}));
        let (client, _sub) = client(transport, true);
        assert!(client.retry_last().await.is_none());
    }
}

//! Retrying dispatch with exponential backoff.

use super::fetch::{FetchError, FetchOptions, FetchResponse, ResilientFetch};
use crate::classify::ErrorCategory;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// How many times and how patiently to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Per-attempt deadline handed to [`ResilientFetch::call`].
    pub deadline: Duration,
    /// Upper bound on any single backoff. `None` leaves backoff uncapped.
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(deadline: Duration) -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            deadline,
            max_delay: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before the retry that follows `attempt` (0-based):
    /// `base_delay * 2^attempt`, clamped by `max_delay` when set.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Wraps [`ResilientFetch`] with retries for server errors and network
/// faults. Client errors and timeouts are never retried.
#[derive(Clone)]
pub struct RetryingDispatcher {
    fetch: ResilientFetch,
}

impl RetryingDispatcher {
    pub fn new(fetch: ResilientFetch) -> Self {
        Self { fetch }
    }

    /// Send `options` to `target`, retrying per `policy`. After the last
    /// attempt the final response or failure is returned unchanged.
    pub async fn dispatch(
        &self,
        target: &str,
        options: &FetchOptions,
        policy: &RetryPolicy,
    ) -> Result<FetchResponse, FetchError> {
        let mut attempt = 0;
        loop {
            let result = self.fetch.call(target, options, policy.deadline).await;
            let exhausted = attempt >= policy.max_retries;

            match &result {
                Ok(response) if !response.is_server_error() => return result,
                Ok(response) => {
                    if exhausted {
                        tracing::warn!(
                            url = target,
                            status = response.status,
                            attempts = attempt + 1,
                            "Server error persisted after retries"
                        );
                        return result;
                    }
                    tracing::debug!(url = target, status = response.status, attempt, "Retrying after server error");
                }
                Err(err) => {
                    let info = err.info();
                    if info.category != ErrorCategory::Network || exhausted {
                        return result;
                    }
                    tracing::debug!(url = target, error = %err, attempt, "Retrying after network error");
                }
            }

            tokio::time::sleep(policy.backoff(attempt)).await;
            attempt += 1;
        }
    }
}

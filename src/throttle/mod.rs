//! Fixed-window request throttle.
//!
//! Each client gets a counter that resets at discrete window boundaries.
//! The request that pushes the count past the limit is itself denied.
//! Records for clients whose window has passed are removed lazily on later
//! calls to [`RequestThrottle::check`].

pub mod middleware;

pub use middleware::{client_id_from_headers, resolve_client_id, throttle_middleware};

use crate::clock::{system_clock, SharedClock};
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Per-client window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleRecord {
    pub count: u32,
    pub window_reset_at: Instant,
}

/// Outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Instant,
    /// Time left until `reset_at`, as seen at decision time
    pub retry_after: Duration,
}

/// Fixed-window limiter keyed by client identity.
pub struct RequestThrottle {
    records: DashMap<String, ThrottleRecord>,
    max_requests: u32,
    window: Duration,
    clock: SharedClock,
    trust_forwarded_headers: bool,
}

impl RequestThrottle {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self::with_clock(max_requests, window, system_clock())
    }

    pub fn with_clock(max_requests: u32, window: Duration, clock: SharedClock) -> Self {
        Self {
            records: DashMap::new(),
            max_requests,
            window,
            clock,
            trust_forwarded_headers: false,
        }
    }

    /// Let the middleware key clients by forwarding headers.
    pub fn trusting_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    pub fn trusts_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }

    /// Count a request from `client_id` and decide whether it may proceed.
    pub fn check(&self, client_id: &str) -> ThrottleDecision {
        let now = self.clock.now();
        self.collect_expired(client_id, now);

        let record = {
            let mut entry = self
                .records
                .entry(client_id.to_string())
                .or_insert(ThrottleRecord {
                    count: 0,
                    window_reset_at: now + self.window,
                });
            if now >= entry.window_reset_at {
                entry.count = 1;
                entry.window_reset_at = now + self.window;
            } else {
                entry.count = entry.count.saturating_add(1);
            }
            *entry
        };

        let allowed = record.count <= self.max_requests;
        if !allowed {
            tracing::debug!(
                client_id,
                count = record.count,
                limit = self.max_requests,
                "Request throttled"
            );
        }

        ThrottleDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(record.count),
            reset_at: record.window_reset_at,
            retry_after: record.window_reset_at.saturating_duration_since(now),
        }
    }

    /// Number of tracked clients, expired or not.
    pub fn tracked_clients(&self) -> usize {
        self.records.len()
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn collect_expired(&self, current_client: &str, now: Instant) {
        self.records
            .retain(|client, record| client == current_client || now < record.window_reset_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Arc;

    fn throttle(max: u32, window_secs: u64) -> (RequestThrottle, ManualClock) {
        let clock = ManualClock::new();
        let throttle = RequestThrottle::with_clock(
            max,
            Duration::from_secs(window_secs),
            Arc::new(clock.clone()),
        );
        (throttle, clock)
    }

    #[test]
    fn test_first_three_allowed_fourth_denied() {
        let (throttle, clock) = throttle(3, 60);
        for expected_remaining in [2, 1, 0] {
            let decision = throttle.check("client-a");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = throttle.check("client-a");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_at > clock.now());
        assert_eq!(denied.retry_after, Duration::from_secs(60));
    }

    #[test]
    fn test_window_restarts_after_reset() {
        let (throttle, clock) = throttle(3, 60);
        for _ in 0..4 {
            throttle.check("client-a");
        }
        clock.advance(Duration::from_secs(60));

        let decision = throttle.check("client-a");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, clock.now() + Duration::from_secs(60));
    }

    #[test]
    fn test_fixed_window_does_not_slide() {
        let (throttle, clock) = throttle(2, 60);
        throttle.check("c");
        clock.advance(Duration::from_secs(50));
        throttle.check("c");
        let denied = throttle.check("c");
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_secs(10));
    }

    #[test]
    fn test_clients_are_independent() {
        let (throttle, _) = throttle(1, 60);
        assert!(throttle.check("a").allowed);
        assert!(!throttle.check("a").allowed);
        assert!(throttle.check("b").allowed);
    }

    #[test]
    fn test_expired_records_are_collected_lazily() {
        let (throttle, clock) = throttle(5, 10);
        throttle.check("a");
        throttle.check("b");
        assert_eq!(throttle.tracked_clients(), 2);

        clock.advance(Duration::from_secs(11));
        throttle.check("c");
        assert_eq!(throttle.tracked_clients(), 1);
    }

    #[test]
    fn test_denied_requests_keep_counting() {
        let (throttle, _) = throttle(1, 60);
        throttle.check("a");
        throttle.check("a");
        let decision = throttle.check("a");
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }
}

//! Capability probe cache.
//!
//! Remembers whether the optional preview converter is installed so the
//! orchestrator does not shell out to check on every request. A record is
//! trusted for the freshness window; after that the next caller re-probes.

use crate::clock::{system_clock, SharedClock};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors a probe may report. They never escape [`CapabilityProbeCache`].
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe command failed to start: {0}")]
    Spawn(String),

    #[error("probe exited with status {0}")]
    ExitStatus(i32),

    #[error("probe failed: {0}")]
    Other(String),
}

/// Checks whether an optional external capability is usable right now.
#[async_trait]
pub trait CapabilityProbe: Send + Sync + 'static {
    async fn probe(&self) -> Result<bool, ProbeError>;
}

/// Last observed availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityProbeRecord {
    pub available: bool,
    pub checked_at: Instant,
}

/// Caches the result of a [`CapabilityProbe`] for a freshness window.
pub struct CapabilityProbeCache {
    probe: Arc<dyn CapabilityProbe>,
    freshness: Duration,
    probe_timeout: Duration,
    /// Held across the probe so a stale window triggers one probe, not one
    /// per concurrent caller.
    record: Mutex<Option<CapabilityProbeRecord>>,
    clock: SharedClock,
}

impl CapabilityProbeCache {
    pub fn new(probe: Arc<dyn CapabilityProbe>, freshness: Duration, probe_timeout: Duration) -> Self {
        Self::with_clock(probe, freshness, probe_timeout, system_clock())
    }

    pub fn with_clock(
        probe: Arc<dyn CapabilityProbe>,
        freshness: Duration,
        probe_timeout: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            probe,
            freshness,
            probe_timeout,
            record: Mutex::new(None),
            clock,
        }
    }

    /// Return cached availability, probing only when the record is missing
    /// or stale. Probe failures and probe timeouts count as unavailable.
    pub async fn is_available(&self) -> bool {
        let mut record = self.record.lock().await;
        let now = self.clock.now();

        if let Some(existing) = *record {
            if now.duration_since(existing.checked_at) < self.freshness {
                return existing.available;
            }
        }

        let available = match tokio::time::timeout(self.probe_timeout, self.probe.probe()).await {
            Ok(Ok(available)) => available,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Capability probe failed, treating as unavailable");
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.probe_timeout.as_millis() as u64,
                    "Capability probe timed out, treating as unavailable"
                );
                false
            }
        };

        tracing::debug!(available, "Capability probe refreshed");
        *record = Some(CapabilityProbeRecord {
            available,
            checked_at: self.clock.now(),
        });
        available
    }

    /// Forget the current record so the next call probes again.
    pub async fn invalidate(&self) {
        *self.record.lock().await = None;
    }

    /// Most recent record without probing.
    pub async fn last_record(&self) -> Option<CapabilityProbeRecord> {
        *self.record.lock().await
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }
}

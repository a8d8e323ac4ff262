//! # Metrics
//!
//! Prometheus export of the resilience layer's counters.
//!
//! **Counters:**
//! - `flowsmith_cache_hits_total` / `flowsmith_cache_misses_total`
//! - `flowsmith_generations_total{outcome}` - `success`, `degraded`, `cache_hit` or the failure's error code
//! - `flowsmith_throttled_total` - requests denied by the throttle
//! - `flowsmith_deadline_exceeded_total` - requests cut off by the deadline guard
//!
//! **Histograms:**
//! - `flowsmith_generation_duration_seconds`
//!
//! **Gauges:**
//! - `flowsmith_cache_entries`, `flowsmith_stored_files`, `flowsmith_converter_available`

pub mod handler;

pub use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use std::time::Instant;

pub const CACHE_HITS: &str = "flowsmith_cache_hits_total";
pub const CACHE_MISSES: &str = "flowsmith_cache_misses_total";
pub const GENERATIONS: &str = "flowsmith_generations_total";
pub const THROTTLED: &str = "flowsmith_throttled_total";
pub const DEADLINE_EXCEEDED: &str = "flowsmith_deadline_exceeded_total";
pub const GENERATION_DURATION: &str = "flowsmith_generation_duration_seconds";

/// Uptime plus the Prometheus handle used to render `/metrics`.
pub struct MetricsCollector {
    start_time: Instant,
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    pub fn new(start_time: Instant, prometheus_handle: PrometheusHandle) -> Self {
        Self {
            start_time,
            prometheus_handle,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Publish point-in-time gauges.
    pub fn update_gauges(&self, cache_entries: usize, stored_files: usize, converter_available: bool) {
        metrics::gauge!("flowsmith_cache_entries").set(cache_entries as f64);
        metrics::gauge!("flowsmith_stored_files").set(stored_files as f64);
        metrics::gauge!("flowsmith_converter_available").set(if converter_available { 1.0 } else { 0.0 });
    }

    /// Render Prometheus metrics in text format.
    pub fn render_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}

/// Install the global Prometheus recorder.
///
/// Generation latency is dominated by the model call, so buckets run from
/// a quarter second to five minutes.
pub fn setup_metrics() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::Matcher;

    let duration_buckets = &[0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(GENERATION_DURATION.to_string()),
            duration_buckets,
        )?
        .install_recorder()?;

    Ok(handle)
}

/// Handle for tests and embedders that must not touch the global recorder
/// twice: installs when possible, otherwise returns a detached handle.
pub fn setup_metrics_or_detached() -> PrometheusHandle {
    setup_metrics().unwrap_or_else(|e| {
        tracing::debug!("Metrics already initialized, creating detached handle: {}", e);
        PrometheusBuilder::new().build_recorder().handle()
    })
}

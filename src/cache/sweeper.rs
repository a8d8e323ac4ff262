//! Background purge of expired entries.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A store that can drop its expired entries on demand.
pub trait Sweepable: Send + Sync + 'static {
    /// Label used in logs.
    fn name(&self) -> &'static str;

    /// Remove expired entries, returning how many were dropped.
    fn sweep(&self) -> usize;
}

/// Spawn a task that sweeps every target on `interval` until cancelled.
pub fn spawn_sweeper(
    targets: Vec<Arc<dyn Sweepable>>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; nothing has expired yet.
        ticker.tick().await;

        tracing::info!(
            interval_seconds = interval.as_secs(),
            targets = targets.len(),
            "Expiry sweeper started"
        );

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    tracing::info!("Expiry sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    for target in &targets {
                        let removed = target.sweep();
                        if removed > 0 {
                            tracing::debug!(store = target.name(), removed, "Swept expired entries");
                        }
                    }
                }
            }
        }
    })
}

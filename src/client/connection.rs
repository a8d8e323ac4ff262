//! Connection quality monitoring.
//!
//! The monitor reads connectivity once at start and afterwards only reacts
//! to platform events delivered through a [`ConnectivitySource`]. It never
//! polls. Its listener lives exactly as long as the returned
//! [`Subscription`].

use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Timeout recommended on degraded links.
pub const SLOW_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout recommended on normal or unknown links.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Coarse link quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkQuality {
    Unknown,
    Slow,
    Normal,
}

impl NetworkQuality {
    /// Parse an effective-connection-type tag such as `3g` or `slow-2g`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "slow-2g" | "2g" | "slow" => NetworkQuality::Slow,
            "3g" | "4g" | "5g" | "wifi" | "ethernet" | "normal" => NetworkQuality::Normal,
            _ => NetworkQuality::Unknown,
        }
    }
}

/// Pure lookup from link quality to request timeout.
pub fn recommended_timeout(quality: NetworkQuality) -> Duration {
    match quality {
        NetworkQuality::Slow => SLOW_TIMEOUT,
        NetworkQuality::Normal | NetworkQuality::Unknown => DEFAULT_TIMEOUT,
    }
}

/// Snapshot of connectivity as last reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub online: bool,
    pub slow: bool,
    pub quality_tag: String,
}

impl ConnectionState {
    fn new(online: bool, quality_tag: &str) -> Self {
        Self {
            online,
            slow: NetworkQuality::from_tag(quality_tag) == NetworkQuality::Slow,
            quality_tag: quality_tag.to_string(),
        }
    }

    pub fn quality(&self) -> NetworkQuality {
        NetworkQuality::from_tag(&self.quality_tag)
    }
}

/// Platform connectivity signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
    QualityChanged(String),
}

/// Broadcast channel standing in for the platform's connectivity callbacks.
#[derive(Debug, Clone)]
pub struct ConnectivitySource {
    tx: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivitySource {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Deliver an event to every live monitor. Returns the listener count.
    pub fn emit(&self, event: ConnectivityEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivitySource {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle that keeps a monitor's event listener alive.
///
/// Dropping it, or calling [`Subscription::unsubscribe`], stops the listener
/// and releases its channel subscription.
#[derive(Debug)]
pub struct Subscription {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop listening and wait for the listener task to exit.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Tracks connectivity and derives a request timeout from it.
#[derive(Debug, Clone)]
pub struct ConnectionQualityMonitor {
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionQualityMonitor {
    /// Start monitoring with the connectivity known right now.
    pub fn start(
        source: &ConnectivitySource,
        initially_online: bool,
        initial_quality: &str,
    ) -> (Self, Subscription) {
        let (state_tx, state_rx) =
            watch::channel(ConnectionState::new(initially_online, initial_quality));
        let mut events = source.subscribe();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => {
                            state_tx.send_modify(|state| apply_event(state, event));
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "Connectivity listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!("Connectivity listener stopped");
        });

        (
            Self { state: state_rx },
            Subscription {
                cancel,
                handle: Some(handle),
            },
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().online
    }

    /// Timeout for the next request given the current link quality.
    pub fn recommended_timeout(&self) -> Duration {
        recommended_timeout(self.state.borrow().quality())
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

fn apply_event(state: &mut ConnectionState, event: ConnectivityEvent) {
    match event {
        ConnectivityEvent::Online => state.online = true,
        ConnectivityEvent::Offline => state.online = false,
        ConnectivityEvent::QualityChanged(tag) => {
            state.slow = NetworkQuality::from_tag(&tag) == NetworkQuality::Slow;
            state.quality_tag = tag;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_from_tag() {
        assert_eq!(NetworkQuality::from_tag("slow-2g"), NetworkQuality::Slow);
        assert_eq!(NetworkQuality::from_tag("2G"), NetworkQuality::Slow);
        assert_eq!(NetworkQuality::from_tag("4g"), NetworkQuality::Normal);
        assert_eq!(NetworkQuality::from_tag(""), NetworkQuality::Unknown);
    }

    #[test]
    fn test_recommended_timeout_table() {
        assert_eq!(recommended_timeout(NetworkQuality::Slow), SLOW_TIMEOUT);
        assert_eq!(recommended_timeout(NetworkQuality::Normal), DEFAULT_TIMEOUT);
        assert_eq!(recommended_timeout(NetworkQuality::Unknown), DEFAULT_TIMEOUT);
        assert!(SLOW_TIMEOUT > DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_initial_state_read_once() {
        let source = ConnectivitySource::new();
        let (monitor, _sub) = ConnectionQualityMonitor::start(&source, false, "3g");
        let state = monitor.state();
        assert!(!state.online);
        assert!(!state.slow);
        assert_eq!(monitor.recommended_timeout(), DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_events_update_state() {
        let source = ConnectivitySource::new();
        let (monitor, _sub) = ConnectionQualityMonitor::start(&source, true, "4g");
        let mut changes = monitor.watch();

        source.emit(ConnectivityEvent::QualityChanged("2g".to_string()));
        changes.changed().await.unwrap();
        assert!(monitor.state().slow);
        assert_eq!(monitor.recommended_timeout(), SLOW_TIMEOUT);

        source.emit(ConnectivityEvent::Offline);
        changes.changed().await.unwrap();
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_listener() {
        let source = ConnectivitySource::new();
        let (monitor, sub) = ConnectionQualityMonitor::start(&source, true, "4g");
        assert_eq!(source.listener_count(), 1);

        sub.unsubscribe().await;
        assert_eq!(source.listener_count(), 0);

        // Events after unsubscribing no longer reach the monitor.
        source.emit(ConnectivityEvent::Offline);
        tokio::task::yield_now().await;
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_drop_releases_listener() {
        let source = ConnectivitySource::new();
        let (_monitor, sub) = ConnectionQualityMonitor::start(&source, true, "4g");
        drop(sub);
        // Aborted tasks release their receiver once the runtime reaps them.
        for _ in 0..10 {
            if source.listener_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(source.listener_count(), 0);
    }
}

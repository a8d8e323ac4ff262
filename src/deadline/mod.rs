//! Hard wall-clock ceiling for inbound requests.
//!
//! The handler runs on its own task. Whichever finishes first, the handler
//! or the ceiling timer, wins a [`CompletionGuard`] and produces the one and
//! only response. A handler that loses is allowed to run to completion and
//! its response is dropped, so in-flight upstream calls are neither leaked
//! nor aborted mid-write.

use crate::api::types::GenerateResponse;
use crate::classify::{classify, ErrorInfo};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// First-writer-wins completion latch.
#[derive(Debug, Default)]
pub struct CompletionGuard {
    completed: AtomicBool,
}

impl CompletionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to complete. Returns true for exactly one caller.
    pub fn try_complete(&self) -> bool {
        self.completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

/// Applies a ceiling to request handling.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineGuard {
    ceiling: Duration,
}

impl DeadlineGuard {
    pub fn new(ceiling: Duration) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Run `handler`, answering with a 504 if it does not finish in time.
    pub async fn run<F>(&self, handler: F) -> Response
    where
        F: Future<Output = Response> + Send + 'static,
    {
        let guard = Arc::new(CompletionGuard::new());
        let (tx, mut rx) = oneshot::channel::<Response>();

        let handler_guard = Arc::clone(&guard);
        tokio::spawn(async move {
            let response = handler.await;
            if handler_guard.try_complete() {
                let _ = tx.send(response);
            } else {
                tracing::debug!(
                    status = response.status().as_u16(),
                    "Discarding response produced after the request deadline"
                );
            }
        });

        tokio::select! {
            result = &mut rx => match result {
                Ok(response) => response,
                // The handler task panicked before sending.
                Err(_) => internal_error(),
            },
            _ = tokio::time::sleep(self.ceiling) => {
                if guard.try_complete() {
                    metrics::counter!(crate::metrics::DEADLINE_EXCEEDED).increment(1);
                    tracing::warn!(
                        ceiling_ms = self.ceiling.as_millis() as u64,
                        "Request exceeded deadline"
                    );
                    timeout_response(self.ceiling)
                } else {
                    // Handler claimed completion between the timer firing and
                    // this branch running; its response is already in flight.
                    rx.await.unwrap_or_else(|_| internal_error())
                }
            }
        }
    }
}

/// Axum middleware enforcing the ceiling on every request.
pub async fn deadline_middleware(
    State(guard): State<DeadlineGuard>,
    request: Request,
    next: Next,
) -> Response {
    guard.run(async move { next.run(request).await }).await
}

/// The 504 body sent when the ceiling elapses.
pub fn timeout_response(ceiling: Duration) -> Response {
    let info = ErrorInfo {
        message: format!(
            "The request did not complete within {} seconds.",
            ceiling.as_secs_f64()
        ),
        ..classify("request deadline exceeded", None)
    };
    (StatusCode::GATEWAY_TIMEOUT, Json(GenerateResponse::error(&info))).into_response()
}

fn internal_error() -> Response {
    let info = classify("", Some(500));
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(GenerateResponse::error(&info)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_completion_guard_first_writer_wins() {
        let guard = CompletionGuard::new();
        assert!(!guard.is_completed());
        assert!(guard.try_complete());
        assert!(!guard.try_complete());
        assert!(guard.is_completed());
    }

    #[test]
    fn test_completion_guard_across_threads() {
        let guard = Arc::new(CompletionGuard::new());
        let wins = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    if guard.try_complete() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fast_handler_response_passes_through() {
        let guard = DeadlineGuard::new(Duration::from_secs(5));
        let response = guard
            .run(async { (StatusCode::CREATED, "done").into_response() })
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_gets_timeout_once() {
        let guard = DeadlineGuard::new(Duration::from_secs(1));
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = Arc::clone(&finished);

        let response = guard
            .run(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                finished_clone.store(true, Ordering::SeqCst);
                StatusCode::OK.into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        // The late handler still runs to completion; its response is dropped.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_timeout_response_body() {
        let response = timeout_response(Duration::from_secs(30));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "timeout");
    }
}

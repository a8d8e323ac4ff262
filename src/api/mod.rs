//! # HTTP API
//!
//! ## Endpoints
//!
//! - `POST /api/generate` - prompt in, diagram and preview URLs out (throttled)
//! - `GET /api/files/:id` - stored artifact bytes
//! - `GET /health` - liveness plus cache and converter status
//! - `GET /metrics` - Prometheus exposition
//!
//! Every route runs under the deadline guard and carries an `x-request-id`.
//! Every error body is a [`GenerateResponse`] with `status: "error"` and a
//! classified `error` object.
//!
//! ## Example
//!
//! ```no_run
//! use flowsmith::api::{create_router, AppState};
//! use flowsmith::config::FlowsmithConfig;
//! use flowsmith::orchestrator::GenerationOrchestrator;
//! use std::sync::Arc;
//!
//! # async fn example(orchestrator: Arc<GenerationOrchestrator>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(FlowsmithConfig::default());
//! let state = Arc::new(AppState::new(orchestrator, config));
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

mod files;
mod generate;
mod health;
pub mod types;

pub use health::HealthResponse;
pub use types::*;

use crate::config::FlowsmithConfig;
use crate::deadline::{deadline_middleware, DeadlineGuard};
use crate::logging::request_id_middleware;
use crate::metrics::MetricsCollector;
use crate::orchestrator::GenerationOrchestrator;
use crate::throttle::{throttle_middleware, RequestThrottle};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;

/// Maximum request body size (1 MiB).
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub config: Arc<FlowsmithConfig>,
    /// `None` when throttling is disabled in config
    pub throttle: Option<Arc<RequestThrottle>>,
    pub deadline: DeadlineGuard,
    pub start_time: Instant,
    pub metrics_collector: Arc<MetricsCollector>,
}

impl AppState {
    /// Build state from config, creating the throttle and deadline guard it
    /// describes.
    pub fn new(orchestrator: Arc<GenerationOrchestrator>, config: Arc<FlowsmithConfig>) -> Self {
        let throttle = config.throttle.enabled.then(|| {
            Arc::new(
                RequestThrottle::new(config.throttle.max_requests, config.throttle.window())
                    .trusting_forwarded_headers(config.throttle.trust_forwarded_headers),
            )
        });
        let deadline = DeadlineGuard::new(config.server.request_timeout());
        let start_time = Instant::now();
        let metrics_collector = Arc::new(MetricsCollector::new(
            start_time,
            crate::metrics::setup_metrics_or_detached(),
        ));

        Self {
            orchestrator,
            config,
            throttle,
            deadline,
            start_time,
            metrics_collector,
        }
    }

    /// Replace the throttle, e.g. with one driven by a manual clock.
    pub fn with_throttle(mut self, throttle: Option<Arc<RequestThrottle>>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_deadline(mut self, deadline: DeadlineGuard) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Create the main API router with all endpoints configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut generate = Router::new().route("/api/generate", post(generate::handle));
    if let Some(throttle) = &state.throttle {
        generate = generate.route_layer(middleware::from_fn_with_state(
            Arc::clone(throttle),
            throttle_middleware,
        ));
    }

    Router::new()
        .merge(generate)
        .route(&format!("{}/:id", FILES_ROUTE_PREFIX), get(files::handle))
        .route("/health", get(health::handle))
        .route("/metrics", get(crate::metrics::handler::metrics_handler))
        .layer(middleware::from_fn_with_state(
            state.deadline,
            deadline_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .with_state(state)
}

//! Shared fakes and builders for Flowsmith integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use flowsmith::api::{create_router, AppState};
use flowsmith::cache::GenerationCache;
use flowsmith::clock::{system_clock, SharedClock};
use flowsmith::config::FlowsmithConfig;
use flowsmith::orchestrator::{
    DiagramModel, GenerationOrchestrator, ModelError, OrchestratorSettings, PreviewRenderer,
    RenderError,
};
use flowsmith::probe::{CapabilityProbe, CapabilityProbeCache, ProbeError};
use flowsmith::storage::ArtifactStore;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const LOGIN_FLOW_XML: &str = "<mxfile><diagram name=\"login\"/></mxfile>";

/// Scripted model: returns a fixed diagram, an error, or sleeps first.
pub struct FakeModel {
    pub calls: AtomicUsize,
    reply: Mutex<Result<String, fn() -> ModelError>>,
    delay: Option<Duration>,
}

impl FakeModel {
    pub fn ok() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply: Mutex::new(Ok(LOGIN_FLOW_XML.to_string())),
            delay: None,
        }
    }

    pub fn failing(make: fn() -> ModelError) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply: Mutex::new(Err(make)),
            delay: None,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::ok()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiagramModel for FakeModel {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, _prompt: &str, _deadline: Duration) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &*self.reply.lock().unwrap() {
            Ok(xml) => Ok(xml.clone()),
            Err(make) => Err(make()),
        }
    }
}

/// Probe with a fixed answer.
pub struct FixedProbe(pub bool);

#[async_trait]
impl CapabilityProbe for FixedProbe {
    async fn probe(&self) -> Result<bool, ProbeError> {
        Ok(self.0)
    }
}

/// Renderer that writes a tiny PNG signature to the output path.
pub struct FakeRenderer;

#[async_trait]
impl PreviewRenderer for FakeRenderer {
    async fn render(&self, _source: &Path, output: &Path, _deadline: Duration) -> Result<(), RenderError> {
        tokio::fs::write(output, b"\x89PNG\r\n\x1a\n")
            .await
            .map_err(|e| RenderError::Unavailable(e.to_string()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub model: Arc<FakeModel>,
    pub dir: TempDir,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Build the full router around fakes.
pub fn build_app(model: FakeModel, converter_available: bool, config: FlowsmithConfig) -> TestApp {
    build_app_with_clock(model, converter_available, config, system_clock())
}

pub fn build_app_with_clock(
    model: FakeModel,
    converter_available: bool,
    mut config: FlowsmithConfig,
    clock: SharedClock,
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    config.storage.dir = dir.path().to_path_buf();

    let model = Arc::new(model);
    let probe_cache = Arc::new(CapabilityProbeCache::new(
        Arc::new(FixedProbe(converter_available)),
        config.converter.probe_freshness(),
        config.converter.probe_timeout(),
    ));
    let cache = Arc::new(Mutex::new(GenerationCache::with_clock(
        config.cache.max_entries,
        config.cache.ttl(),
        clock.clone(),
    )));
    let store = Arc::new(
        ArtifactStore::open_with_clock(dir.path(), config.storage.file_ttl(), clock).unwrap(),
    );
    let orchestrator = Arc::new(GenerationOrchestrator::new(
        model.clone(),
        Arc::new(FakeRenderer),
        probe_cache,
        cache,
        store,
        OrchestratorSettings {
            model_deadline: config.model.timeout(),
            render_deadline: config.converter.timeout(),
            max_prompt_chars: config.model.max_prompt_chars,
        },
    ));

    let state = Arc::new(AppState::new(orchestrator, Arc::new(config)));
    TestApp {
        router: create_router(Arc::clone(&state)),
        state,
        model,
        dir,
    }
}

pub fn generate_request(prompt: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::from(serde_json::json!({ "prompt": prompt }).to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

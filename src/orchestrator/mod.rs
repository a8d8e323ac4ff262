//! End-to-end generation workflow.
//!
//! [`GenerationOrchestrator::generate`] ties the cache, the probe cache and
//! the two external collaborators together:
//!
//! 1. validate and fingerprint the prompt
//! 2. serve a live cache hit without calling the model
//! 3. otherwise call the model and store the document
//! 4. render a preview if the converter is available; a missing or failing
//!    converter downgrades the result to success-with-warning
//! 5. cache the artifact and return it
//!
//! Two concurrent misses for the same fingerprint both call the model; no
//! single-flight coalescing is attempted.

pub mod model;
pub mod render;

pub use model::{surfaced_status, DiagramModel, ModelError, OpenAiDiagramModel};
pub use render::{CliProbe, CliRenderer, PreviewRenderer, RenderError};

use crate::cache::{GenerationCache, RequestFingerprint};
use crate::classify::{classify, ErrorInfo};
use crate::probe::CapabilityProbeCache;
use crate::storage::{ArtifactKind, ArtifactStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Warning attached when the converter is not installed.
pub const WARNING_PREVIEW_UNAVAILABLE: &str =
    "Diagram generated, but the preview renderer is not available. Download the file to view it.";
/// Warning attached when the converter ran and failed.
pub const WARNING_PREVIEW_FAILED: &str =
    "Diagram generated, but the preview could not be rendered. Download the file to view it.";

/// The generation cache as shared by the orchestrator and the sweeper.
pub type SharedGenerationCache = Arc<Mutex<GenerationCache<RequestFingerprint, Artifact>>>;

/// A generated diagram and its optional preview, by storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub document_id: String,
    pub preview_id: Option<String>,
    pub fingerprint: RequestFingerprint,
    pub created_at: DateTime<Utc>,
}

/// Result of [`GenerationOrchestrator::generate`].
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub artifact: Artifact,
    /// True when served from the generation cache
    pub cached: bool,
    /// Set when the preview is missing
    pub warning: Option<String>,
}

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl GenerateError {
    /// HTTP status the API answers with for this failure.
    pub fn http_status(&self) -> u16 {
        match self {
            GenerateError::InvalidPrompt(_) => 422,
            GenerateError::Model(ModelError::MissingCredentials(_)) => 401,
            GenerateError::Model(ModelError::Upstream { status, .. }) => {
                model::surfaced_status(*status)
            }
            GenerateError::Model(ModelError::Network(_)) => 503,
            GenerateError::Model(ModelError::Timeout(_)) => 504,
            GenerateError::Model(ModelError::InvalidResponse(_)) => 502,
            GenerateError::Storage(_) => 500,
        }
    }

    /// Classified view of this failure, consistent with [`Self::http_status`].
    pub fn info(&self) -> ErrorInfo {
        match self {
            GenerateError::InvalidPrompt(reason) => {
                let mut info = classify("", Some(422));
                info.message = reason.clone();
                info
            }
            GenerateError::Model(e) => e.info(),
            GenerateError::Storage(_) => {
                let mut info = classify("", Some(500));
                info.message = "The generated diagram could not be saved.".to_string();
                info
            }
        }
    }
}

/// Deadlines and limits for one generation.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub model_deadline: Duration,
    pub render_deadline: Duration,
    pub max_prompt_chars: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            model_deadline: Duration::from_secs(120),
            render_deadline: Duration::from_secs(30),
            max_prompt_chars: 4000,
        }
    }
}

/// Produces artifacts from prompts, degrading when previews are unavailable.
pub struct GenerationOrchestrator {
    model: Arc<dyn DiagramModel>,
    renderer: Arc<dyn PreviewRenderer>,
    probe_cache: Arc<CapabilityProbeCache>,
    cache: SharedGenerationCache,
    store: Arc<ArtifactStore>,
    settings: OrchestratorSettings,
}

impl GenerationOrchestrator {
    pub fn new(
        model: Arc<dyn DiagramModel>,
        renderer: Arc<dyn PreviewRenderer>,
        probe_cache: Arc<CapabilityProbeCache>,
        cache: SharedGenerationCache,
        store: Arc<ArtifactStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            model,
            renderer,
            probe_cache,
            cache,
            store,
            settings,
        }
    }

    /// Turn `prompt` into an artifact.
    ///
    /// Every call, failed or not, is counted under one outcome label.
    pub async fn generate(&self, prompt: &str) -> Result<GenerationOutcome, GenerateError> {
        let start = Instant::now();
        let result = self.produce(prompt).await;
        record_outcome(outcome_label(&result), start);
        result
    }

    async fn produce(&self, prompt: &str) -> Result<GenerationOutcome, GenerateError> {
        let prompt = self.validate(prompt)?;
        let fingerprint = RequestFingerprint::of(prompt);

        if let Some(artifact) = self.cached(&fingerprint) {
            metrics::counter!(crate::metrics::CACHE_HITS).increment(1);
            tracing::info!(fingerprint = %fingerprint.short(), "Generation cache hit");
            let warning = artifact
                .preview_id
                .is_none()
                .then(|| WARNING_PREVIEW_UNAVAILABLE.to_string());
            return Ok(GenerationOutcome {
                artifact,
                cached: true,
                warning,
            });
        }
        metrics::counter!(crate::metrics::CACHE_MISSES).increment(1);

        tracing::info!(
            fingerprint = %fingerprint.short(),
            model = self.model.name(),
            "Generating diagram"
        );
        let source = match self
            .model
            .generate(prompt, self.settings.model_deadline)
            .await
        {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(error = %e, "Model call failed");
                return Err(e.into());
            }
        };
        let document = self
            .store
            .save(ArtifactKind::Document, source.as_bytes())
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to store generated diagram"))?;

        let (preview_id, warning) = self.render_preview(&document.path).await;

        let artifact = Artifact {
            document_id: document.id,
            preview_id,
            fingerprint: fingerprint.clone(),
            created_at: Utc::now(),
        };
        self.lock_cache().put(fingerprint, artifact.clone());

        Ok(GenerationOutcome {
            artifact,
            cached: false,
            warning,
        })
    }

    /// Number of live-or-unswept entries in the generation cache.
    pub fn cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    pub fn probe_cache(&self) -> &Arc<CapabilityProbeCache> {
        &self.probe_cache
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    fn validate<'a>(&self, prompt: &'a str) -> Result<&'a str, GenerateError> {
        let trimmed = prompt.trim();
        if trimmed.is_empty() {
            return Err(GenerateError::InvalidPrompt(
                "Prompt must not be empty.".to_string(),
            ));
        }
        let chars = trimmed.chars().count();
        if chars > self.settings.max_prompt_chars {
            return Err(GenerateError::InvalidPrompt(format!(
                "Prompt is {} characters long; the limit is {}.",
                chars, self.settings.max_prompt_chars
            )));
        }
        Ok(trimmed)
    }

    /// Cache lookup that also drops entries whose files have expired.
    fn cached(&self, fingerprint: &RequestFingerprint) -> Option<Artifact> {
        let mut cache = self.lock_cache();
        let artifact = cache.get(fingerprint)?;
        if self.store.contains(&artifact.document_id) {
            Some(artifact)
        } else {
            tracing::debug!(fingerprint = %fingerprint.short(), "Cached artifact files expired");
            cache.remove(fingerprint);
            None
        }
    }

    async fn render_preview(&self, source: &std::path::Path) -> (Option<String>, Option<String>) {
        if !self.probe_cache.is_available().await {
            tracing::info!("Preview converter unavailable, skipping preview");
            return (None, Some(WARNING_PREVIEW_UNAVAILABLE.to_string()));
        }

        let (preview_id, preview_path) = self.store.reserve(ArtifactKind::Preview);
        match self
            .renderer
            .render(source, &preview_path, self.settings.render_deadline)
            .await
        {
            Ok(()) => {
                self.store
                    .register(preview_id.clone(), preview_path, ArtifactKind::Preview);
                (Some(preview_id), None)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Preview rendering failed");
                if e.indicates_missing_tool() {
                    self.probe_cache.invalidate().await;
                }
                let _ = tokio::fs::remove_file(&preview_path).await;
                (None, Some(WARNING_PREVIEW_FAILED.to_string()))
            }
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, GenerationCache<RequestFingerprint, Artifact>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Label for `flowsmith_generations_total{outcome}`.
fn outcome_label(result: &Result<GenerationOutcome, GenerateError>) -> &'static str {
    match result {
        Ok(outcome) if outcome.cached => "cache_hit",
        Ok(outcome) if outcome.warning.is_some() => "degraded",
        Ok(_) => "success",
        Err(e) => e.info().code(),
    }
}

fn record_outcome(outcome: &'static str, start: Instant) {
    metrics::counter!(crate::metrics::GENERATIONS, "outcome" => outcome).increment(1);
    metrics::histogram!(crate::metrics::GENERATION_DURATION)
        .record(start.elapsed().as_secs_f64());
}

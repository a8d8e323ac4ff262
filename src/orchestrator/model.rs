//! Language-model collaborator.
//!
//! The orchestrator only needs "prompt in, diagram source out, within a
//! deadline". [`OpenAiDiagramModel`] provides that over any
//! OpenAI-compatible chat completions endpoint.

use crate::classify::{classify, classify_status, ErrorInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Instructions sent ahead of every user prompt.
pub const SYSTEM_PROMPT: &str = "You are a diagram generator. Reply with a single draw.io \
diagram as uncompressed XML, starting with <mxfile> and ending with </mxfile>. \
Do not add explanations or markdown.";

/// Errors produced by a [`DiagramModel`].
#[derive(Error, Debug)]
pub enum ModelError {
    /// Connection-level failure (DNS, refused, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// The model did not answer within the deadline.
    #[error("Model request timed out after {0:?}")]
    Timeout(Duration),

    /// The model API answered with an error status.
    #[error("Model API error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// No API key is configured.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// The answer did not contain a diagram.
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Classified view of this failure.
    pub fn info(&self) -> ErrorInfo {
        match self {
            ModelError::Network(message) => classify(&format!("network error: {}", message), None),
            ModelError::Timeout(_) => classify("model request timed out", None),
            ModelError::Upstream { status, message } => {
                let mut info = classify("", Some(surfaced_status(*status)));
                if !message.is_empty() {
                    info.message = message.clone();
                }
                info
            }
            ModelError::MissingCredentials(_) => {
                let mut info = classify("", Some(401));
                info.message = "The model API key is not configured.".to_string();
                info
            }
            ModelError::InvalidResponse(_) => {
                let mut info = classify("", Some(502));
                info.message = "The model returned an unusable diagram.".to_string();
                info
            }
        }
    }
}

/// Status the API answers with when the model endpoint returned `status`.
///
/// Only input-shaped rejections reach the caller as 422. Any other 4xx from
/// the model (wrong model name, conflicts) is a gateway fault, not a reason
/// to edit the prompt.
pub fn surfaced_status(status: u16) -> u16 {
    match status {
        401 | 403 => 401,
        402 => 402,
        429 => 429,
        400 | 413 | 422 => 422,
        s if s >= 500 => 503,
        _ => 502,
    }
}

/// Opaque prompt → diagram source collaborator.
#[async_trait]
pub trait DiagramModel: Send + Sync + 'static {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Produce diagram source for `prompt`, giving up after `deadline`.
    async fn generate(&self, prompt: &str, deadline: Duration) -> Result<String, ModelError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// [`DiagramModel`] backed by an OpenAI-compatible `/v1/chat/completions`.
pub struct OpenAiDiagramModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiDiagramModel {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.endpoint)
    }
}

#[async_trait]
impl DiagramModel for OpenAiDiagramModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, deadline: Duration) -> Result<String, ModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::MissingCredentials("no API key configured".to_string()))?;

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .timeout(deadline)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, deadline))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let info = classify_status(status.as_u16(), &text);
            return Err(ModelError::Upstream {
                status: status.as_u16(),
                message: info.message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| map_body_error(e, deadline))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::InvalidResponse("no choices returned".to_string()))?;

        extract_diagram(&content)
            .ok_or_else(|| ModelError::InvalidResponse("reply contains no <mxfile> document".to_string()))
    }
}

fn map_transport_error(err: reqwest::Error, deadline: Duration) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout(deadline)
    } else {
        ModelError::Network(err.to_string())
    }
}

fn map_body_error(err: reqwest::Error, deadline: Duration) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout(deadline)
    } else {
        ModelError::InvalidResponse(err.to_string())
    }
}

/// Pull the `<mxfile>` document out of a model reply, tolerating prose and
/// markdown fences around it.
pub fn extract_diagram(reply: &str) -> Option<String> {
    let start = reply.find("<mxfile")?;
    let end_tag = "</mxfile>";
    let end = reply[start..].find(end_tag)? + start + end_tag.len();
    Some(reply[start..end].to_string())
}

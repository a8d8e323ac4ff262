//! Preview converter collaborator.
//!
//! The converter is an optional CLI (draw.io desktop by default) that turns
//! a diagram file into a PNG. It may not be installed, so availability is
//! checked through [`CliProbe`] and cached by the probe cache.

use crate::probe::{CapabilityProbe, ProbeError};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Placeholder replaced with the source file path in converter arguments.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced with the output file path in converter arguments.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Error, Debug)]
pub enum RenderError {
    /// The converter binary could not be started at all.
    #[error("converter unavailable: {0}")]
    Unavailable(String),

    #[error("converter timed out after {0:?}")]
    Timeout(Duration),

    #[error("converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("converter produced no output file")]
    MissingOutput,
}

impl RenderError {
    /// True when the failure suggests the tool itself is gone.
    pub fn indicates_missing_tool(&self) -> bool {
        matches!(self, RenderError::Unavailable(_))
    }
}

/// Opaque file → image collaborator.
#[async_trait]
pub trait PreviewRenderer: Send + Sync + 'static {
    async fn render(&self, source: &Path, output: &Path, deadline: Duration)
        -> Result<(), RenderError>;
}

/// Default converter arguments for the draw.io desktop CLI.
pub fn default_converter_args() -> Vec<String> {
    ["--export", "--format", "png", "--output", OUTPUT_PLACEHOLDER, INPUT_PLACEHOLDER]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Runs the converter CLI as a child process.
#[derive(Debug, Clone)]
pub struct CliRenderer {
    command: String,
    args: Vec<String>,
}

impl CliRenderer {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    fn expand_args(&self, source: &Path, output: &Path) -> Vec<String> {
        let input = source.to_string_lossy();
        let out = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &out)
            })
            .collect()
    }
}

#[async_trait]
impl PreviewRenderer for CliRenderer {
    async fn render(
        &self,
        source: &Path,
        output: &Path,
        deadline: Duration,
    ) -> Result<(), RenderError> {
        let args = self.expand_args(source, output);
        tracing::debug!(command = %self.command, ?args, "Running preview converter");

        let child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::Unavailable(e.to_string()))?;

        let result = tokio::time::timeout(deadline, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout(deadline))?
            .map_err(|e| RenderError::Failed {
                status: "io error".to_string(),
                stderr: e.to_string(),
            })?;

        if !result.status.success() {
            return Err(RenderError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(RenderError::MissingOutput);
        }
        Ok(())
    }
}

/// Availability probe running `<command> --version`.
#[derive(Debug, Clone)]
pub struct CliProbe {
    command: String,
    args: Vec<String>,
}

impl CliProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec!["--version".to_string()],
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl CapabilityProbe for CliProbe {
    async fn probe(&self) -> Result<bool, ProbeError> {
        let status = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(true),
            Ok(status) => Err(ProbeError::ExitStatus(status.code().unwrap_or(-1))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ProbeError::Spawn(e.to_string())),
        }
    }
}

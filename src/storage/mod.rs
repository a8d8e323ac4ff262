//! Local artifact storage.
//!
//! Generated documents and previews are written to a directory and served
//! back by id. Files live for a fixed TTL; an expired file answers with
//! [`StoreError::Expired`] until the sweeper deletes it, after which the id
//! is simply unknown.

use crate::cache::Sweepable;
use crate::clock::{system_clock, SharedClock};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Content type for draw.io documents, which `mime_guess` does not know.
pub const DRAWIO_CONTENT_TYPE: &str = "application/vnd.jgraph.mxfile";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file expired: {0}")]
    Expired(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a stored file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Diagram source produced by the model
    Document,
    /// Rendered image produced by the converter
    Preview,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Document => "drawio",
            ArtifactKind::Preview => "png",
        }
    }

    fn fallback_content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Document => DRAWIO_CONTENT_TYPE,
            ArtifactKind::Preview => "application/octet-stream",
        }
    }
}

/// Metadata for one stored file.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    expires_at: Instant,
}

/// Directory-backed artifact store with per-file expiry.
pub struct ArtifactStore {
    dir: PathBuf,
    ttl: Duration,
    files: DashMap<String, StoredFile>,
    clock: SharedClock,
}

impl ArtifactStore {
    /// Create the store, making sure the directory exists.
    pub fn open(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self, StoreError> {
        Self::open_with_clock(dir, ttl, system_clock())
    }

    pub fn open_with_clock(
        dir: impl Into<PathBuf>,
        ttl: Duration,
        clock: SharedClock,
    ) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            ttl,
            files: DashMap::new(),
            clock,
        })
    }

    /// Write `bytes` as a new file of `kind`.
    pub async fn save(&self, kind: ArtifactKind, bytes: &[u8]) -> Result<StoredFile, StoreError> {
        let (id, path) = self.reserve(kind);
        tokio::fs::write(&path, bytes).await?;
        Ok(self.register(id, path, kind))
    }

    /// Allocate an id and a path for a file some other process will write.
    pub fn reserve(&self, kind: ArtifactKind) -> (String, PathBuf) {
        let id = uuid::Uuid::new_v4().to_string();
        let path = self.dir.join(format!("{}.{}", id, kind.extension()));
        (id, path)
    }

    /// Track a file written to a reserved path.
    pub fn register(&self, id: String, path: PathBuf, kind: ArtifactKind) -> StoredFile {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.clone());
        let content_type = mime_guess::from_path(&path)
            .first_raw()
            .unwrap_or_else(|| kind.fallback_content_type())
            .to_string();
        let stored = StoredFile {
            id: id.clone(),
            kind,
            path,
            file_name,
            content_type,
            created_at: Utc::now(),
            expires_at: self.clock.now() + self.ttl,
        };
        self.files.insert(id, stored.clone());
        stored
    }

    /// Metadata for a live file.
    pub fn lookup(&self, id: &str) -> Result<StoredFile, StoreError> {
        let file = self
            .files
            .get(id)
            .map(|f| f.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if self.clock.now() >= file.expires_at {
            return Err(StoreError::Expired(id.to_string()));
        }
        Ok(file)
    }

    /// True when `id` refers to a live file.
    pub fn contains(&self, id: &str) -> bool {
        self.lookup(id).is_ok()
    }

    /// Read a live file.
    pub async fn read(&self, id: &str) -> Result<(StoredFile, Vec<u8>), StoreError> {
        let file = self.lookup(id)?;
        match tokio::fs::read(&file.path).await {
            Ok(bytes) => Ok((file, bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.files.remove(id);
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete expired files and forget them.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<StoredFile> = self
            .files
            .iter()
            .filter(|f| now >= f.expires_at)
            .map(|f| f.clone())
            .collect();

        for file in &expired {
            if let Err(e) = std::fs::remove_file(&file.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(id = %file.id, error = %e, "Failed to delete expired file");
                    continue;
                }
            }
            self.files.remove(&file.id);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Sweepable for ArtifactStore {
    fn name(&self) -> &'static str {
        "artifact_store"
    }

    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}

//! Combined report cache store.
//!
//! `write` is the only mutator and replaces the stored document atomically;
//! `read_latest` never mutates. Readers therefore observe either the previous
//! complete document or the new complete document, never a partial one.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use duet_core::{CombinedReport, CombinedReportArtifact, FileDescriptor, StorageError};
use tempfile::NamedTempFile;

/// Default file name of the persisted combined report.
pub const DEFAULT_CACHE_FILE: &str = "combined-report.json";

/// Durable holder of the latest combined report.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Atomically replace the stored report.
    ///
    /// A report whose counts disagree with its records is rejected with
    /// `CountMismatch`. On failure the previously stored report is left untouched.
    async fn write(&self, report: &CombinedReport) -> Result<FileDescriptor, StorageError>;

    /// Read the latest stored report, or `None` if nothing was ever written.
    ///
    /// A stored document that violates the count invariant is an error.
    async fn read_latest(&self) -> Result<Option<CombinedReportArtifact>, StorageError>;

    /// Whether a report has been stored, without loading it.
    async fn has_artifact(&self) -> Result<bool, StorageError> {
        Ok(self.read_latest().await?.is_some())
    }
}

// ============================================================================
// FILE STORE
// ============================================================================

/// File-backed store: one JSON document replaced via write-to-temp + rename.
///
/// Blocking filesystem work runs on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    dir: PathBuf,
    file_name: String,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    /// Store in `dir` using [`DEFAULT_CACHE_FILE`].
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, DEFAULT_CACHE_FILE)
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn write(&self, report: &CombinedReport) -> Result<FileDescriptor, StorageError> {
        report.verify_counts()?;
        let path = self.path();
        let bytes = serde_json::to_vec(report).map_err(|e| StorageError::WriteFailed {
            path: path.display().to_string(),
            reason: format!("serialization failed: {}", e),
        })?;

        let dir = self.dir.clone();
        let target = path.clone();
        let size = bytes.len() as u64;
        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &bytes))
            .await
            .map_err(|e| StorageError::WriteFailed {
                path: path.display().to_string(),
                reason: format!("write task failed: {}", e),
            })??;

        tracing::debug!(path = %path.display(), size, "Combined report written");

        Ok(FileDescriptor {
            name: self.file_name.clone(),
            size,
            universal_last_update: report.meta.generated_at,
        })
    }

    async fn read_latest(&self) -> Result<Option<CombinedReportArtifact>, StorageError> {
        let path = self.path();
        let display = path.display().to_string();
        let read_path = path.clone();

        let bytes = tokio::task::spawn_blocking(move || std::fs::read(&read_path))
            .await
            .map_err(|e| StorageError::ReadFailed {
                path: display.clone(),
                reason: format!("read task failed: {}", e),
            })?;

        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    path: display,
                    reason: e.to_string(),
                })
            }
        };

        let report: CombinedReport =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::ReadFailed {
                path: display.clone(),
                reason: format!("invalid document: {}", e),
            })?;
        report.verify_counts()?;

        let file = FileDescriptor {
            name: self.file_name.clone(),
            size: bytes.len() as u64,
            universal_last_update: report.meta.generated_at,
        };
        Ok(Some(CombinedReportArtifact::new(report, file)))
    }

    async fn has_artifact(&self) -> Result<bool, StorageError> {
        let path = self.path();
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::ReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

/// Write to a temp file in the target directory, fsync, then rename over the target.
fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let write_failed = |reason: String| StorageError::WriteFailed {
        path: target.display().to_string(),
        reason,
    };

    std::fs::create_dir_all(dir).map_err(|e| write_failed(e.to_string()))?;
    let temp = NamedTempFile::new_in(dir).map_err(|e| write_failed(e.to_string()))?;
    temp.as_file()
        .write_all(bytes)
        .map_err(|e| write_failed(e.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| write_failed(e.to_string()))?;
    temp.persist(target)
        .map_err(|e| write_failed(e.error.to_string()))?;
    Ok(())
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory store for tests and development.
///
/// The stored artifact is swapped as a whole under a short write lock.
#[derive(Debug, Clone)]
pub struct InMemoryArtifactStore {
    file_name: String,
    current: Arc<RwLock<Option<Arc<CombinedReportArtifact>>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            file_name: DEFAULT_CACHE_FILE.to_string(),
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Seed the store, bypassing the write path.
    pub fn with_report(report: CombinedReport) -> Result<Self, StorageError> {
        let store = Self::new();
        let artifact = store.build_artifact(report)?;
        *store.current.write().map_err(|_| StorageError::LockPoisoned)? = Some(Arc::new(artifact));
        Ok(store)
    }

    fn build_artifact(&self, report: CombinedReport) -> Result<CombinedReportArtifact, StorageError> {
        report.verify_counts()?;
        let size = serde_json::to_vec(&report)
            .map_err(|e| StorageError::WriteFailed {
                path: self.file_name.clone(),
                reason: e.to_string(),
            })?
            .len() as u64;
        let file = FileDescriptor {
            name: self.file_name.clone(),
            size,
            universal_last_update: report.meta.generated_at,
        };
        Ok(CombinedReportArtifact::new(report, file))
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn write(&self, report: &CombinedReport) -> Result<FileDescriptor, StorageError> {
        let artifact = self.build_artifact(report.clone())?;
        let file = artifact.file.clone();
        *self.current.write().map_err(|_| StorageError::LockPoisoned)? = Some(Arc::new(artifact));
        Ok(file)
    }

    async fn read_latest(&self) -> Result<Option<CombinedReportArtifact>, StorageError> {
        let current = self
            .current
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .clone();
        Ok(current.map(|artifact| artifact.as_ref().clone()))
    }
}

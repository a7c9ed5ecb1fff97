//! File-based snapshot backends.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};

use super::{SnapshotBackend, SnapshotError};

/// One JSON file per key in a directory, replaced atomically.
#[derive(Debug, Clone)]
pub struct FileSnapshotBackend {
    dir: PathBuf,
    max_bytes: Option<usize>,
    name: &'static str,
}

impl FileSnapshotBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_bytes: None,
            name: "file",
        }
    }

    /// Reject writes larger than `max_bytes` with `QuotaExceeded`.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl SnapshotBackend for FileSnapshotBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn persist(&self, key: &str, bytes: &[u8]) -> Result<(), SnapshotError> {
        if let Some(max) = self.max_bytes {
            if bytes.len() > max {
                return Err(SnapshotError::QuotaExceeded {
                    backend: self.name,
                    reason: format!("{} bytes exceeds limit of {}", bytes.len(), max),
                });
            }
        }

        std::fs::create_dir_all(&self.dir)?;
        let temp = NamedTempFile::new_in(&self.dir)?;
        temp.as_file()
            .write_all(bytes)
            .map_err(|e| io_to_snapshot(self.name, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| io_to_snapshot(self.name, e))?;
        temp.persist(self.key_path(key))
            .map_err(|e| io_to_snapshot(self.name, e.error))?;
        Ok(())
    }

    fn restore(&self, key: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        match std::fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, key: &str) -> Result<(), SnapshotError> {
        match std::fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Out-of-space conditions count as quota failures.
fn io_to_snapshot(backend: &'static str, err: std::io::Error) -> SnapshotError {
    match err.kind() {
        ErrorKind::StorageFull | ErrorKind::FileTooLarge => SnapshotError::QuotaExceeded {
            backend,
            reason: err.to_string(),
        },
        _ => SnapshotError::Io(err),
    }
}

/// Files in a temporary directory that lives as long as this value.
///
/// Snapshots survive reloads within a session and are removed when the
/// session ends.
#[derive(Debug)]
pub struct SessionSnapshotBackend {
    _dir: TempDir,
    inner: FileSnapshotBackend,
}

impl SessionSnapshotBackend {
    pub fn new() -> Result<Self, SnapshotError> {
        let dir = tempfile::Builder::new().prefix("duet-session-").tempdir()?;
        let inner = FileSnapshotBackend {
            dir: dir.path().to_path_buf(),
            max_bytes: None,
            name: "session",
        };
        Ok(Self { _dir: dir, inner })
    }

    pub fn dir(&self) -> &Path {
        self.inner.dir()
    }
}

impl SnapshotBackend for SessionSnapshotBackend {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn persist(&self, key: &str, bytes: &[u8]) -> Result<(), SnapshotError> {
        self.inner.persist(key, bytes)
    }

    fn restore(&self, key: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        self.inner.restore(key)
    }

    fn remove(&self, key: &str) -> Result<(), SnapshotError> {
        self.inner.remove(key)
    }
}

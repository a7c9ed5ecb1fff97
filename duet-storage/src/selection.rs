//! Active selection pointer store.
//!
//! One `activeAcompanhamentoId` per authenticated user; last write wins.
//! Setting `None` clears the pointer.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use duet_core::StorageError;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

/// Per-user selection pointer storage.
#[async_trait]
pub trait SelectionStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, user_id: &str, selection: Option<String>) -> Result<(), StorageError>;
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// Concurrent in-memory store.
#[derive(Debug, Default, Clone)]
pub struct InMemorySelectionStore {
    selections: Arc<DashMap<String, String>>,
}

impl InMemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SelectionStore for InMemorySelectionStore {
    async fn get(&self, user_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.selections.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn set(&self, user_id: &str, selection: Option<String>) -> Result<(), StorageError> {
        match selection {
            Some(id) => {
                self.selections.insert(user_id.to_string(), id);
            }
            None => {
                self.selections.remove(user_id);
            }
        }
        Ok(())
    }
}

// ============================================================================
// FILE
// ============================================================================

type SelectionMap = BTreeMap<String, String>;

/// JSON file holding `{ userId: activeAcompanhamentoId }`.
///
/// Writers are serialized; every write rewrites the file atomically.
#[derive(Debug, Clone)]
pub struct FileSelectionStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileSelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<SelectionMap, StorageError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_map(&path))
            .await
            .map_err(|e| selection_error(format!("read task failed: {}", e)))?
    }
}

#[async_trait]
impl SelectionStore for FileSelectionStore {
    async fn get(&self, user_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load().await?.remove(user_id))
    }

    async fn set(&self, user_id: &str, selection: Option<String>) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.load().await?;
        match selection {
            Some(id) => {
                map.insert(user_id.to_string(), id);
            }
            None => {
                map.remove(user_id);
            }
        }

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || store_map(&path, &map))
            .await
            .map_err(|e| selection_error(format!("write task failed: {}", e)))?
    }
}

fn load_map(path: &Path) -> Result<SelectionMap, StorageError> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| selection_error(format!("invalid selection file {}: {}", path.display(), e))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(SelectionMap::new()),
        Err(e) => Err(selection_error(e.to_string())),
    }
}

fn store_map(path: &Path, map: &SelectionMap) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(map).map_err(|e| selection_error(e.to_string()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| selection_error(e.to_string()))?;

    let temp = NamedTempFile::new_in(&dir).map_err(|e| selection_error(e.to_string()))?;
    temp.as_file()
        .write_all(&bytes)
        .map_err(|e| selection_error(e.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| selection_error(e.to_string()))?;
    temp.persist(path)
        .map_err(|e| selection_error(e.error.to_string()))?;
    Ok(())
}

fn selection_error(reason: String) -> StorageError {
    StorageError::Selection { reason }
}

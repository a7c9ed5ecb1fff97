//! In-memory snapshot backend. Last-resort tier; nothing survives the process.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{SnapshotBackend, SnapshotError};

const BACKEND_NAME: &str = "memory";

#[derive(Debug, Default)]
pub struct MemorySnapshotBackend {
    max_bytes: Option<usize>,
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySnapshotBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the total bytes held across all keys.
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes: Some(max_bytes),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl SnapshotBackend for MemorySnapshotBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn persist(&self, key: &str, bytes: &[u8]) -> Result<(), SnapshotError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(max) = self.max_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if others + bytes.len() > max {
                return Err(SnapshotError::QuotaExceeded {
                    backend: BACKEND_NAME,
                    reason: format!("{} bytes would exceed limit of {}", others + bytes.len(), max),
                });
            }
        }
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn restore(&self, key: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), SnapshotError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(key);
        Ok(())
    }
}

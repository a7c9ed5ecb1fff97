//! In-memory query cache and its persisted snapshot form.
//!
//! The client keeps the last known result of every query it issued. A
//! [`PersistedQuerySnapshot`] bundles all of them under one storage key so a
//! later session can start warm.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use duet_core::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COMBINED_REPORT_QUERY: &str = "combined-report";
pub const RUN_LOG_QUERY: &str = "combined-report-log";
pub const ACTIVE_SELECTION_QUERY: &str = "active-acompanhamento";

/// Default maximum snapshot age.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// One cached query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEntry {
    pub data: Value,
    pub data_updated_at: Timestamp,
    pub is_stale: bool,
}

/// Serialized bundle of every cached query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedQuerySnapshot {
    pub buster: String,
    pub saved_at: Timestamp,
    pub queries: BTreeMap<String, QueryEntry>,
}

/// Why a stored snapshot was not used.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotRejected {
    #[error("snapshot is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("snapshot buster {found:?} does not match {expected:?}")]
    BusterMismatch { expected: String, found: String },
    #[error("snapshot saved at {saved_at} is older than {max_age_secs}s")]
    Expired {
        saved_at: Timestamp,
        max_age_secs: u64,
    },
}

impl PersistedQuerySnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode and validate a stored snapshot against the current buster and
    /// age limit.
    pub fn decode(
        bytes: &[u8],
        buster: &str,
        max_age: Duration,
        now: Timestamp,
    ) -> Result<Self, SnapshotRejected> {
        let snapshot: PersistedQuerySnapshot = serde_json::from_slice(bytes)?;
        if snapshot.buster != buster {
            return Err(SnapshotRejected::BusterMismatch {
                expected: buster.to_string(),
                found: snapshot.buster,
            });
        }
        let age = now.signed_duration_since(snapshot.saved_at);
        let too_old = chrono::Duration::from_std(max_age)
            .map(|limit| age > limit)
            .unwrap_or(false);
        if too_old {
            return Err(SnapshotRejected::Expired {
                saved_at: snapshot.saved_at,
                max_age_secs: max_age.as_secs(),
            });
        }
        Ok(snapshot)
    }
}

/// Concurrent map of query results.
///
/// `revision` increases on every mutation so persistence can skip writes when
/// nothing changed.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: DashMap<String, QueryEntry>,
    revision: AtomicU64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh result for `key`.
    pub fn set<T: Serialize>(&self, key: &str, data: &T) -> Result<(), serde_json::Error> {
        self.set_at(key, data, Utc::now())
    }

    pub fn set_at<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        updated_at: Timestamp,
    ) -> Result<(), serde_json::Error> {
        let entry = QueryEntry {
            data: serde_json::to_value(data)?,
            data_updated_at: updated_at,
            is_stale: false,
        };
        self.entries.insert(key.to_string(), entry);
        self.bump();
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        match serde_json::from_value(entry.data.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(query = key, error = %e, "Cached query has an unexpected shape");
                None
            }
        }
    }

    pub fn entry(&self, key: &str) -> Option<QueryEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Mark a query stale without dropping its data.
    pub fn invalidate(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.is_stale = true;
            drop(entry);
            self.bump();
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.bump();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, buster: &str, saved_at: Timestamp) -> PersistedQuerySnapshot {
        let queries = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        PersistedQuerySnapshot {
            buster: buster.to_string(),
            saved_at,
            queries,
        }
    }

    /// Load restored entries. An entry already in memory wins when it is at
    /// least as recent. Returns how many entries were taken.
    pub fn hydrate(&self, snapshot: PersistedQuerySnapshot) -> usize {
        let mut taken = 0;
        for (key, restored) in snapshot.queries {
            let newer_in_memory = self
                .entries
                .get(&key)
                .is_some_and(|current| current.data_updated_at >= restored.data_updated_at);
            if !newer_in_memory {
                self.entries.insert(key, restored);
                taken += 1;
            }
        }
        if taken > 0 {
            self.bump();
        }
        taken
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_and_invalidate() {
        let cache = QueryCache::new();
        assert!(cache.is_empty());

        cache
            .set(ACTIVE_SELECTION_QUERY, &Some("ACC-1".to_string()))
            .expect("serializable");
        let before = cache.revision();
        assert_eq!(
            cache.get::<Option<String>>(ACTIVE_SELECTION_QUERY),
            Some(Some("ACC-1".to_string()))
        );

        cache.invalidate(ACTIVE_SELECTION_QUERY);
        let entry = cache.entry(ACTIVE_SELECTION_QUERY).expect("entry kept");
        assert!(entry.is_stale);
        assert_eq!(entry.data, json!("ACC-1"));
        assert!(cache.revision() > before);
    }

    #[test]
    fn test_decode_rejects_wrong_buster() {
        let cache = QueryCache::new();
        cache.set(RUN_LOG_QUERY, &json!({ "log": [] })).expect("serializable");
        let bytes = cache.snapshot("v1", Utc::now()).encode().expect("encodes");

        let result = PersistedQuerySnapshot::decode(&bytes, "v2", DEFAULT_MAX_AGE, Utc::now());
        assert!(matches!(result, Err(SnapshotRejected::BusterMismatch { .. })));
    }

    #[test]
    fn test_decode_rejects_expired_snapshot() {
        let saved_at = Utc::now() - chrono::Duration::hours(25);
        let bytes = QueryCache::new()
            .snapshot("v1", saved_at)
            .encode()
            .expect("encodes");

        let result = PersistedQuerySnapshot::decode(&bytes, "v1", DEFAULT_MAX_AGE, Utc::now());
        assert!(matches!(result, Err(SnapshotRejected::Expired { .. })));

        let fresh = PersistedQuerySnapshot::decode(
            &bytes,
            "v1",
            Duration::from_secs(26 * 60 * 60),
            Utc::now(),
        );
        assert!(fresh.is_ok());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = PersistedQuerySnapshot::decode(b"\x00\x01", "v1", DEFAULT_MAX_AGE, Utc::now());
        assert!(matches!(result, Err(SnapshotRejected::Corrupt(_))));
    }

    #[test]
    fn test_snapshot_wire_names() {
        let cache = QueryCache::new();
        cache.set(RUN_LOG_QUERY, &json!({ "log": ["a"] })).expect("serializable");
        let value = serde_json::to_value(cache.snapshot("v1", Utc::now())).expect("serializes");
        assert!(value["savedAt"].is_string());
        let entry = &value["queries"][RUN_LOG_QUERY];
        assert!(entry["dataUpdatedAt"].is_string());
        assert_eq!(entry["isStale"], json!(false));
    }

    #[test]
    fn test_hydrate_keeps_newer_memory_entries() {
        let older = Utc::now() - chrono::Duration::minutes(10);
        let restored = QueryCache::new();
        restored.set_at(RUN_LOG_QUERY, &json!("old log"), older).expect("serializable");
        restored
            .set_at(ACTIVE_SELECTION_QUERY, &json!("ACC-9"), older)
            .expect("serializable");
        let snapshot = restored.snapshot("v1", Utc::now());

        let cache = QueryCache::new();
        cache.set(RUN_LOG_QUERY, &json!("new log")).expect("serializable");

        assert_eq!(cache.hydrate(snapshot), 1);
        assert_eq!(cache.get::<String>(RUN_LOG_QUERY), Some("new log".to_string()));
        assert_eq!(cache.get::<String>(ACTIVE_SELECTION_QUERY), Some("ACC-9".to_string()));
    }
}

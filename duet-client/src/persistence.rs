//! Warm-start persistence for the query cache.
//!
//! The snapshot tier is chosen once per session (LMDB, then JSON files, then
//! a session temp dir, then memory). Every operation here swallows failures:
//! a write that does not land only costs the next session its warm start.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use duet_storage::{
    FileSnapshotBackend, LmdbSnapshotBackend, SessionSnapshotBackend, SnapshotTier,
    TieredSnapshotStore,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::PersistenceConfig;
use crate::query_cache::{PersistedQuerySnapshot, QueryCache};

/// Storage key of the query cache snapshot.
pub const SNAPSHOT_KEY: &str = "duet-query-cache";

/// Probe the configured tiers and pick the session's backend.
pub fn select_snapshot_store(config: &PersistenceConfig) -> TieredSnapshotStore {
    let mut builder = TieredSnapshotStore::builder();

    match LmdbSnapshotBackend::open(config.lmdb_dir(), config.lmdb_max_size_mb) {
        Ok(lmdb) => builder = builder.primary(lmdb),
        Err(e) => tracing::warn!(error = %e, "LMDB snapshot tier unavailable"),
    }

    let mut files = FileSnapshotBackend::new(config.snapshot_dir());
    if let Some(max_bytes) = config.file_max_bytes {
        files = files.with_max_bytes(max_bytes);
    }
    builder = builder.secondary(files);

    match SessionSnapshotBackend::new() {
        Ok(session) => builder = builder.tertiary(session),
        Err(e) => tracing::warn!(error = %e, "Session snapshot tier unavailable"),
    }

    builder.select()
}

/// Persists and restores a [`QueryCache`] through a tiered snapshot store.
///
/// Clones share one write lock. A write snapshots the cache only after taking
/// it, so a later write never stores an older snapshot than an earlier one.
#[derive(Debug, Clone)]
pub struct QueryPersister {
    store: Arc<TieredSnapshotStore>,
    buster: String,
    max_age: Duration,
    write_lock: Arc<Mutex<()>>,
}

impl QueryPersister {
    pub fn new(store: TieredSnapshotStore, buster: impl Into<String>, max_age: Duration) -> Self {
        Self {
            store: Arc::new(store),
            buster: buster.into(),
            max_age,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self::new(
            select_snapshot_store(config),
            config.buster.clone(),
            config.max_age(),
        )
    }

    pub fn active_tier(&self) -> SnapshotTier {
        self.store.active_tier()
    }

    /// Write the current cache contents. Blocking; failures are logged.
    pub fn persist_now(&self, cache: &QueryCache) {
        let _write = self.lock_writes();
        let snapshot = cache.snapshot(&self.buster, Utc::now());
        match snapshot.encode() {
            Ok(bytes) => self.store.persist(SNAPSHOT_KEY, &bytes),
            Err(e) => tracing::warn!(error = %e, "Query cache snapshot not encodable"),
        }
    }

    /// Read the stored snapshot. Missing, corrupt, foreign or expired
    /// snapshots all read as `None`.
    pub fn restore(&self) -> Option<PersistedQuerySnapshot> {
        let bytes = self.store.restore(SNAPSHOT_KEY)?;
        match PersistedQuerySnapshot::decode(&bytes, &self.buster, self.max_age, Utc::now()) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::info!(reason = %e, "Stored query snapshot discarded");
                None
            }
        }
    }

    /// Restore into `cache`. Returns whether a snapshot was found.
    pub fn restore_into(&self, cache: &QueryCache) -> bool {
        match self.restore() {
            Some(snapshot) => {
                let restored = cache.hydrate(snapshot);
                tracing::info!(
                    queries = restored,
                    tier = %self.active_tier(),
                    "Query cache restored"
                );
                true
            }
            None => false,
        }
    }

    /// Delete the stored snapshot (logout or reset).
    pub fn remove(&self) {
        let _write = self.lock_writes();
        self.store.remove(SNAPSHOT_KEY);
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persist on a blocking worker without waiting for it.
    pub fn spawn_persist(&self, cache: Arc<QueryCache>) -> JoinHandle<()> {
        let persister = self.clone();
        tokio::task::spawn_blocking(move || persister.persist_now(&cache))
    }

    /// Persist whenever the cache changed, once per `interval`, plus a final
    /// write on shutdown.
    pub fn spawn_persist_loop(
        &self,
        cache: Arc<QueryCache>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let persister = self.clone();
        let mut persisted_revision = cache.revision();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let revision = cache.revision();
                        if revision == persisted_revision {
                            continue;
                        }
                        persisted_revision = revision;
                        if let Err(e) = persister.spawn_persist(Arc::clone(&cache)).await {
                            tracing::warn!(error = %e, "Snapshot persist task failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            if cache.revision() != persisted_revision {
                if let Err(e) = persister.spawn_persist(Arc::clone(&cache)).await {
                    tracing::warn!(error = %e, "Final snapshot persist failed");
                }
            }
        })
    }
}

//! Tiered snapshot persistence.
//!
//! Clients keep a warm copy of their query results across sessions. Backends
//! are tried in priority order once per session and the first one whose
//! probe round-trip succeeds becomes active:
//!
//! 1. [`LmdbSnapshotBackend`]: transactional, quota-generous (primary)
//! 2. [`FileSnapshotBackend`]: JSON files in the client data dir (secondary)
//! 3. [`SessionSnapshotBackend`]: files in a per-session temp dir (tertiary)
//! 4. [`MemorySnapshotBackend`]: degraded, memory-only
//!
//! [`TieredSnapshotStore`] never propagates errors to callers: failures are
//! logged and swallowed. A quota failure demotes the session to the next
//! available tier (one-way) and retries the write there once.

use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

pub mod file;
pub mod lmdb;
pub mod memory;

pub use file::{FileSnapshotBackend, SessionSnapshotBackend};
pub use lmdb::LmdbSnapshotBackend;
pub use memory::MemorySnapshotBackend;

/// Key written and removed by availability probes.
pub const PROBE_KEY: &str = "__duet_probe__";

const PROBE_VALUE: &[u8] = b"probe";

// ============================================================================
// ERRORS
// ============================================================================

/// Error type for snapshot backend operations.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The backend cannot be used in this session.
    #[error("Snapshot backend unavailable: {0}")]
    Unavailable(String),

    /// The backend is out of space for this write.
    #[error("Snapshot quota exceeded on {backend}: {reason}")]
    QuotaExceeded { backend: &'static str, reason: String },

    /// Probe read back something other than what it wrote.
    #[error("Snapshot probe mismatch on {0}")]
    ProbeMismatch(&'static str),

    /// LMDB error.
    #[error("LMDB error: {0}")]
    Lmdb(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapshotError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, SnapshotError::QuotaExceeded { .. })
    }
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Byte-oriented key-value backend for snapshots.
pub trait SnapshotBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn persist(&self, key: &str, bytes: &[u8]) -> Result<(), SnapshotError>;

    fn restore(&self, key: &str) -> Result<Option<Vec<u8>>, SnapshotError>;

    fn remove(&self, key: &str) -> Result<(), SnapshotError>;

    /// Write/read/remove round-trip on [`PROBE_KEY`].
    fn probe(&self) -> Result<(), SnapshotError> {
        self.persist(PROBE_KEY, PROBE_VALUE)?;
        let read_back = self.restore(PROBE_KEY)?;
        self.remove(PROBE_KEY)?;
        match read_back {
            Some(bytes) if bytes == PROBE_VALUE => Ok(()),
            _ => Err(SnapshotError::ProbeMismatch(self.name())),
        }
    }
}

// ============================================================================
// TIERS
// ============================================================================

/// Which tier a session is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotTier {
    Primary,
    Secondary,
    Tertiary,
    Degraded,
}

impl fmt::Display for SnapshotTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnapshotTier::Primary => "primary",
            SnapshotTier::Secondary => "secondary",
            SnapshotTier::Tertiary => "tertiary",
            SnapshotTier::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

/// Builder collecting the candidate backends of a session.
#[derive(Default)]
pub struct TieredSnapshotBuilder {
    primary: Option<Box<dyn SnapshotBackend>>,
    secondary: Option<Box<dyn SnapshotBackend>>,
    tertiary: Option<Box<dyn SnapshotBackend>>,
    degraded: Option<MemorySnapshotBackend>,
}

impl TieredSnapshotBuilder {
    pub fn primary(mut self, backend: impl SnapshotBackend + 'static) -> Self {
        self.primary = Some(Box::new(backend));
        self
    }

    pub fn secondary(mut self, backend: impl SnapshotBackend + 'static) -> Self {
        self.secondary = Some(Box::new(backend));
        self
    }

    pub fn tertiary(mut self, backend: impl SnapshotBackend + 'static) -> Self {
        self.tertiary = Some(Box::new(backend));
        self
    }

    /// Replace the default unbounded memory fallback.
    pub fn degraded(mut self, backend: MemorySnapshotBackend) -> Self {
        self.degraded = Some(backend);
        self
    }

    /// Probe candidates in priority order and pick the first available one.
    pub fn select(self) -> TieredSnapshotStore {
        let mut tiers: Vec<(SnapshotTier, Box<dyn SnapshotBackend>)> = Vec::with_capacity(4);
        for (tier, backend) in [
            (SnapshotTier::Primary, self.primary),
            (SnapshotTier::Secondary, self.secondary),
            (SnapshotTier::Tertiary, self.tertiary),
        ] {
            if let Some(backend) = backend {
                tiers.push((tier, backend));
            }
        }
        let degraded: Box<dyn SnapshotBackend> = Box::new(self.degraded.unwrap_or_default());
        tiers.push((SnapshotTier::Degraded, degraded));

        let active = first_available(&tiers, 0);
        let store = TieredSnapshotStore {
            tiers,
            active: RwLock::new(active),
        };
        tracing::info!(
            tier = %store.active_tier(),
            backend = store.active_backend_name(),
            "Snapshot tier selected"
        );
        store
    }
}

/// Index of the first tier at or after `from` whose probe succeeds.
///
/// The last tier (memory) is returned when nothing else probes cleanly.
fn first_available(tiers: &[(SnapshotTier, Box<dyn SnapshotBackend>)], from: usize) -> usize {
    let last = tiers.len().saturating_sub(1);
    for (index, (tier, backend)) in tiers.iter().enumerate().skip(from) {
        match backend.probe() {
            Ok(()) => return index,
            Err(e) => tracing::warn!(
                tier = %tier,
                backend = backend.name(),
                error = %e,
                "Snapshot tier unavailable"
            ),
        }
    }
    last
}

/// Session-scoped tiered snapshot store.
pub struct TieredSnapshotStore {
    tiers: Vec<(SnapshotTier, Box<dyn SnapshotBackend>)>,
    active: RwLock<usize>,
}

impl TieredSnapshotStore {
    pub fn builder() -> TieredSnapshotBuilder {
        TieredSnapshotBuilder::default()
    }

    fn active_index(&self) -> usize {
        self.active
            .read()
            .map(|index| *index)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    pub fn active_tier(&self) -> SnapshotTier {
        self.tiers[self.active_index()].0
    }

    pub fn active_backend_name(&self) -> &'static str {
        self.tiers[self.active_index()].1.name()
    }

    /// Move past `from` to the next available tier. One-way.
    fn demote(&self, from: usize) -> usize {
        let mut active = self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *active != from {
            // Another writer already demoted.
            return *active;
        }
        let last = self.tiers.len() - 1;
        if from >= last {
            return from;
        }
        let next = first_available(&self.tiers, from + 1);
        *active = next;
        tracing::warn!(
            from = %self.tiers[from].0,
            to = %self.tiers[next].0,
            backend = self.tiers[next].1.name(),
            "Snapshot tier demoted"
        );
        next
    }

    /// Persist a snapshot. Errors are logged, never returned.
    pub fn persist(&self, key: &str, bytes: &[u8]) {
        let index = self.active_index();
        let (tier, backend) = &self.tiers[index];
        match backend.persist(key, bytes) {
            Ok(()) => {
                tracing::debug!(tier = %tier, bytes = bytes.len(), "Snapshot persisted");
            }
            Err(e) if e.is_quota_exceeded() => {
                tracing::warn!(tier = %tier, error = %e, "Snapshot quota exceeded");
                let next = self.demote(index);
                if next == index {
                    return;
                }
                // The demoted tier may still hold an older snapshot.
                if let Err(e) = backend.remove(key) {
                    tracing::debug!(tier = %tier, error = %e, "Stale snapshot not removed");
                }
                let (next_tier, next_backend) = &self.tiers[next];
                if let Err(e) = next_backend.persist(key, bytes) {
                    tracing::warn!(tier = %next_tier, error = %e, "Snapshot persist failed after demotion");
                }
            }
            Err(e) => {
                tracing::warn!(tier = %tier, error = %e, "Snapshot persist failed");
            }
        }
    }

    /// Restore a snapshot. Any failure reads as "no snapshot".
    pub fn restore(&self, key: &str) -> Option<Vec<u8>> {
        let (tier, backend) = &self.tiers[self.active_index()];
        match backend.restore(key) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(tier = %tier, error = %e, "Snapshot restore failed");
                None
            }
        }
    }

    /// Remove a snapshot. Errors are logged, never returned.
    pub fn remove(&self, key: &str) {
        let (tier, backend) = &self.tiers[self.active_index()];
        if let Err(e) = backend.remove(key) {
            tracing::warn!(tier = %tier, error = %e, "Snapshot remove failed");
        }
    }
}

impl fmt::Debug for TieredSnapshotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredSnapshotStore")
            .field("active_tier", &self.active_tier())
            .field("backend", &self.active_backend_name())
            .field("tiers", &self.tiers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Backend whose every operation fails.
    struct BrokenBackend;

    impl SnapshotBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn persist(&self, _key: &str, _bytes: &[u8]) -> Result<(), SnapshotError> {
            Err(SnapshotError::Unavailable("disabled".to_string()))
        }

        fn restore(&self, _key: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
            Err(SnapshotError::Unavailable("disabled".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<(), SnapshotError> {
            Err(SnapshotError::Unavailable("disabled".to_string()))
        }
    }

    #[test]
    fn test_selects_primary_when_available() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = TieredSnapshotStore::builder()
            .primary(
                LmdbSnapshotBackend::open(temp_dir.path().join("lmdb"), 4)
                    .expect("lmdb should open"),
            )
            .secondary(FileSnapshotBackend::new(temp_dir.path().join("files")))
            .select();
        assert_eq!(store.active_tier(), SnapshotTier::Primary);

        store.persist("queries", b"{\"a\":1}");
        assert_eq!(store.restore("queries"), Some(b"{\"a\":1}".to_vec()));
    }

    #[test]
    fn test_failing_primary_selects_secondary() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = TieredSnapshotStore::builder()
            .primary(BrokenBackend)
            .secondary(FileSnapshotBackend::new(temp_dir.path()))
            .select();
        assert_eq!(store.active_tier(), SnapshotTier::Secondary);

        store.persist("queries", b"payload");
        assert_eq!(store.restore("queries"), Some(b"payload".to_vec()));
    }

    #[test]
    fn test_all_broken_degrades_to_memory() {
        let store = TieredSnapshotStore::builder()
            .primary(BrokenBackend)
            .secondary(BrokenBackend)
            .tertiary(BrokenBackend)
            .select();
        assert_eq!(store.active_tier(), SnapshotTier::Degraded);
        assert_eq!(store.active_backend_name(), "memory");

        store.persist("queries", b"payload");
        assert_eq!(store.restore("queries"), Some(b"payload".to_vec()));
    }

    #[test]
    fn test_quota_exceeded_demotes_and_retries() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = TieredSnapshotStore::builder()
            .primary(FileSnapshotBackend::new(temp_dir.path().join("small")).with_max_bytes(16))
            .secondary(FileSnapshotBackend::new(temp_dir.path().join("large")))
            .select();
        assert_eq!(store.active_tier(), SnapshotTier::Primary);

        store.persist("queries", b"tiny");
        let big = vec![b'x'; 64];
        store.persist("queries", &big);

        assert_eq!(store.active_tier(), SnapshotTier::Secondary);
        assert_eq!(store.restore("queries"), Some(big));

        // One-way: small writes stay on the secondary.
        store.persist("queries", b"tiny");
        assert_eq!(store.active_tier(), SnapshotTier::Secondary);
        assert!(!temp_dir.path().join("small").join("queries.json").exists());
    }

    #[test]
    fn test_quota_on_last_tier_is_swallowed() {
        let store = TieredSnapshotStore::builder()
            .degraded(MemorySnapshotBackend::with_max_bytes(8))
            .select();
        store.persist("queries", b"way too large for the limit");
        assert_eq!(store.active_tier(), SnapshotTier::Degraded);
        assert_eq!(store.restore("queries"), None);
    }

    #[test]
    fn test_restore_failure_reads_as_absent() {
        let broken: Box<dyn SnapshotBackend> = Box::new(BrokenBackend);
        let store = TieredSnapshotStore {
            tiers: vec![(SnapshotTier::Primary, broken)],
            active: RwLock::new(0),
        };
        assert_eq!(store.restore("queries"), None);
        store.remove("queries");
        store.persist("queries", b"x");
    }

    #[test]
    fn test_remove_clears_snapshot() {
        let store = TieredSnapshotStore::builder().select();
        store.persist("queries", b"payload");
        store.remove("queries");
        assert_eq!(store.restore("queries"), None);
    }
}

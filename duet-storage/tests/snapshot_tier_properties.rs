//! Property tests for tiered snapshot persistence
//!
//! Persist-then-restore returns the same bytes on whichever tier the session
//! selected, including when the primary tier is forced to fail.

use duet_storage::{
    FileSnapshotBackend, LmdbSnapshotBackend, MemorySnapshotBackend, SnapshotBackend,
    SnapshotError, SnapshotTier, TieredSnapshotStore,
};
use proptest::prelude::*;
use tempfile::TempDir;

struct ForcedFailure;

impl SnapshotBackend for ForcedFailure {
    fn name(&self) -> &'static str {
        "forced-failure"
    }

    fn persist(&self, _key: &str, _bytes: &[u8]) -> Result<(), SnapshotError> {
        Err(SnapshotError::Unavailable("forced".to_string()))
    }

    fn restore(&self, _key: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        Err(SnapshotError::Unavailable("forced".to_string()))
    }

    fn remove(&self, _key: &str) -> Result<(), SnapshotError> {
        Err(SnapshotError::Unavailable("forced".to_string()))
    }
}

fn arb_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,23}"
}

fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..4096)
}

fn temp_dir() -> Result<TempDir, TestCaseError> {
    TempDir::new().map_err(|e| TestCaseError::fail(format!("temp dir: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_primary_round_trip(key in arb_key(), payload in arb_payload()) {
        let dir = temp_dir()?;
        let lmdb = LmdbSnapshotBackend::open(dir.path().join("lmdb"), 8)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let store = TieredSnapshotStore::builder()
            .primary(lmdb)
            .secondary(FileSnapshotBackend::new(dir.path().join("files")))
            .select();
        prop_assert_eq!(store.active_tier(), SnapshotTier::Primary);

        store.persist(&key, &payload);
        prop_assert_eq!(store.restore(&key), Some(payload));
    }

    #[test]
    fn prop_failing_primary_uses_secondary(key in arb_key(), payload in arb_payload()) {
        let dir = temp_dir()?;
        let store = TieredSnapshotStore::builder()
            .primary(ForcedFailure)
            .secondary(FileSnapshotBackend::new(dir.path()))
            .select();
        prop_assert_eq!(store.active_tier(), SnapshotTier::Secondary);

        store.persist(&key, &payload);
        prop_assert_eq!(store.restore(&key), Some(payload));

        store.remove(&key);
        prop_assert_eq!(store.restore(&key), None);
    }

    #[test]
    fn prop_quota_demotion_keeps_latest_write(
        key in arb_key(),
        small in prop::collection::vec(any::<u8>(), 0..64),
        large in prop::collection::vec(any::<u8>(), 128..512),
    ) {
        let dir = temp_dir()?;
        let store = TieredSnapshotStore::builder()
            .secondary(FileSnapshotBackend::new(dir.path()).with_max_bytes(100))
            .degraded(MemorySnapshotBackend::new())
            .select();
        prop_assert_eq!(store.active_tier(), SnapshotTier::Secondary);

        store.persist(&key, &small);
        prop_assert_eq!(store.restore(&key), Some(small));

        store.persist(&key, &large);
        prop_assert_eq!(store.active_tier(), SnapshotTier::Degraded);
        prop_assert_eq!(store.restore(&key), Some(large));
    }
}

//! LMDB snapshot backend.
//!
//! Single unnamed database keyed by snapshot key. A full memory map is
//! reported as [`SnapshotError::QuotaExceeded`] so the tiered store can move
//! the session to the next tier.

use std::fmt;
use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, MdbError};

use super::{SnapshotBackend, SnapshotError};

const BACKEND_NAME: &str = "lmdb";

/// LMDB-backed snapshot storage.
pub struct LmdbSnapshotBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    path: PathBuf,
}

impl LmdbSnapshotBackend {
    /// Open (or create) an environment at `path` with a map of `max_size_mb`.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, SnapshotError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb.max(1) * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| SnapshotError::Unavailable(format!("failed to open LMDB environment: {}", e)))?;

        let mut wtxn = env.write_txn().map_err(lmdb_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(lmdb_error)?;
        wtxn.commit().map_err(lmdb_error)?;

        Ok(Self {
            env,
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotBackend for LmdbSnapshotBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn persist(&self, key: &str, bytes: &[u8]) -> Result<(), SnapshotError> {
        let mut wtxn = self.env.write_txn().map_err(lmdb_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), bytes)
            .map_err(lmdb_error)?;
        wtxn.commit().map_err(lmdb_error)
    }

    fn restore(&self, key: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        let rtxn = self.env.read_txn().map_err(lmdb_error)?;
        let value = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(lmdb_error)?
            .map(|bytes| bytes.to_vec());
        Ok(value)
    }

    fn remove(&self, key: &str) -> Result<(), SnapshotError> {
        let mut wtxn = self.env.write_txn().map_err(lmdb_error)?;
        self.db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(lmdb_error)?;
        wtxn.commit().map_err(lmdb_error)
    }
}

impl fmt::Debug for LmdbSnapshotBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LmdbSnapshotBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn lmdb_error(err: heed::Error) -> SnapshotError {
    match err {
        heed::Error::Mdb(MdbError::MapFull) => SnapshotError::QuotaExceeded {
            backend: BACKEND_NAME,
            reason: "LMDB map is full".to_string(),
        },
        heed::Error::Io(io) => SnapshotError::Io(io),
        other => SnapshotError::Lmdb(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_and_probe() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend = LmdbSnapshotBackend::open(temp_dir.path(), 4).expect("lmdb should open");

        assert!(backend.probe().is_ok());
        assert_eq!(backend.restore("queries").expect("restore should succeed"), None);

        backend.persist("queries", b"first").expect("persist should succeed");
        backend.persist("queries", b"second").expect("overwrite should succeed");
        assert_eq!(
            backend.restore("queries").expect("restore should succeed"),
            Some(b"second".to_vec())
        );

        backend.remove("queries").expect("remove should succeed");
        backend.remove("queries").expect("removing a missing key should succeed");
        assert_eq!(backend.restore("queries").expect("restore should succeed"), None);
    }

    #[test]
    fn test_map_full_is_quota() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend = LmdbSnapshotBackend::open(temp_dir.path(), 1).expect("lmdb should open");

        let big = vec![7u8; 2 * 1024 * 1024];
        let err = backend
            .persist("queries", &big)
            .expect_err("write larger than the map should fail");
        assert!(err.is_quota_exceeded(), "unexpected error: {err}");
    }

    #[test]
    fn test_unopenable_path_errors() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"file").expect("write should succeed");

        assert!(LmdbSnapshotBackend::open(blocker.join("lmdb"), 4).is_err());
    }
}

//! DUET Storage - Cache Store and Coordination State
//!
//! Storage abstractions used by the refresh coordinator and the read path:
//!
//! - [`ArtifactStore`]: durable holder of the latest combined report, with an
//!   atomic-replace file implementation and an in-memory one.
//! - [`RunStateCell`]: single-flight guard state, released by a drop guard.
//! - [`RunLogSink`]: bounded, ordered refresh run log.
//! - [`SelectionStore`]: per-user active selection pointer.
//! - [`snapshot`]: tiered snapshot backends (LMDB, JSON files, session
//!   directory, memory) used by clients for warm start.

pub mod artifact_store;
pub mod run_log;
pub mod run_state;
pub mod selection;
pub mod snapshot;

pub use artifact_store::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore, DEFAULT_CACHE_FILE};
pub use run_log::{InMemoryRunLog, RunLogSink, DEFAULT_RUN_LOG_CAPACITY};
pub use run_state::{LocalRunState, RunGuard, RunStateCell};
pub use selection::{FileSelectionStore, InMemorySelectionStore, SelectionStore};
pub use snapshot::{
    FileSnapshotBackend, LmdbSnapshotBackend, MemorySnapshotBackend, SessionSnapshotBackend,
    SnapshotBackend, SnapshotError, SnapshotTier, TieredSnapshotBuilder, TieredSnapshotStore,
};

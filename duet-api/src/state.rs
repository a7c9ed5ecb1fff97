//! Shared application state for Axum routers.

use std::sync::Arc;

use duet_storage::{
    ArtifactStore, FileArtifactStore, FileSelectionStore, InMemoryRunLog, InMemorySelectionStore,
    RunLogSink, RunStateCell, SelectionStore,
};
use duet_upstream::ReportSource;

use crate::config::ServiceConfig;
use crate::services::RefreshCoordinator;

/// Application-wide state shared across all routes.
///
/// The store, run log and run state are the coordinator's own, so reads
/// see exactly what refreshes write.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: RefreshCoordinator,
    pub store: Arc<dyn ArtifactStore>,
    pub run_log: Arc<dyn RunLogSink>,
    pub run_state: Arc<dyn RunStateCell>,
    pub selections: Arc<dyn SelectionStore>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(coordinator: RefreshCoordinator, selections: Arc<dyn SelectionStore>) -> Self {
        Self {
            store: coordinator.store(),
            run_log: coordinator.run_log(),
            run_state: coordinator.run_state(),
            coordinator,
            selections,
            start_time: std::time::Instant::now(),
        }
    }

    /// Production wiring: file-backed cache, bounded run log, and a file or
    /// in-memory selection store depending on `selection_file`.
    pub fn from_config(config: &ServiceConfig, source: Arc<dyn ReportSource>) -> Self {
        let store: Arc<dyn ArtifactStore> = Arc::new(FileArtifactStore::new(
            config.cache_dir.clone(),
            config.cache_file.clone(),
        ));
        let run_log: Arc<dyn RunLogSink> = Arc::new(InMemoryRunLog::new(config.run_log_capacity));
        let coordinator = RefreshCoordinator::new(source, store)
            .with_run_log(run_log)
            .with_fetch_mode(config.fetch_mode);

        let selections: Arc<dyn SelectionStore> = match &config.selection_file {
            Some(path) => Arc::new(FileSelectionStore::new(path.clone())),
            None => Arc::new(InMemorySelectionStore::new()),
        };

        Self::new(coordinator, selections)
    }
}

crate::impl_from_ref! {
    RefreshCoordinator => coordinator,
    Arc<dyn ArtifactStore> => store,
    Arc<dyn RunLogSink> => run_log,
    Arc<dyn RunStateCell> => run_state,
    Arc<dyn SelectionStore> => selections,
    std::time::Instant => start_time,
}

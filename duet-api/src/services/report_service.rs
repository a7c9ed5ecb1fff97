//! Report Service
//!
//! Read path for the cached combined report. Never triggers a refresh and
//! never waits for one.

use duet_core::{CombinedReportArtifact, StorageError};
use duet_storage::ArtifactStore;

use crate::telemetry::METRICS;

/// What a cache read found.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead {
    Present(Box<CombinedReportArtifact>),
    /// No artifact was ever written.
    Absent,
    Failed(StorageError),
}

impl CacheRead {
    fn label(&self) -> &'static str {
        match self {
            CacheRead::Present(_) => "hit",
            CacheRead::Absent => "empty",
            CacheRead::Failed(_) => "error",
        }
    }
}

/// Read the latest artifact from the store.
pub async fn read_latest_report(store: &dyn ArtifactStore) -> CacheRead {
    let read = match store.read_latest().await {
        Ok(Some(artifact)) => CacheRead::Present(Box::new(artifact)),
        Ok(None) => CacheRead::Absent,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read cached report");
            CacheRead::Failed(e)
        }
    };

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_cache_read(read.label());
    }
    read
}

// =============================================================================
// TESTS
// =============================================================================

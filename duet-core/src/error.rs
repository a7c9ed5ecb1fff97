//! Error types for DUET operations

use thiserror::Error;

use crate::SourceReport;

/// Upstream report source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Upstream configuration missing: {field}")]
    ConfigMissing { field: String },

    #[error("Fetching {report} timed out after {timeout_secs}s")]
    Timeout {
        report: SourceReport,
        timeout_secs: u64,
    },

    #[error("Request for {report} failed with status {status}: {message}")]
    RequestFailed {
        report: SourceReport,
        status: u16,
        message: String,
    },

    #[error("Transport error fetching {report}: {reason}")]
    Transport { report: SourceReport, reason: String },

    #[error("Invalid response for {report}: {reason}")]
    InvalidResponse { report: SourceReport, reason: String },
}

/// Cache store, selection store and run log errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cache write failed for {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Cache read failed for {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error(
        "Cached report is inconsistent: {records} records but counts {report134_count} + {report151_count}"
    )]
    CountMismatch {
        records: usize,
        report134_count: usize,
        report151_count: usize,
    },

    #[error("Selection store failure: {reason}")]
    Selection { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Why a refresh run failed.
///
/// A run that finds another run in flight is not an error; see
/// `RefreshOutcome::AlreadyRunning` in the API crate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Upstream configuration missing: {field}")]
    ConfigMissing { field: String },

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(UpstreamError),

    #[error("Upstream error: {0}")]
    Upstream(UpstreamError),

    #[error("Cache write failed: {0}")]
    StorageWriteFailure(StorageError),
}

impl RefreshError {
    /// Stable machine-readable kind, used in responses and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            RefreshError::ConfigMissing { .. } => "CONFIG_MISSING",
            RefreshError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            RefreshError::Upstream(_) => "UPSTREAM_ERROR",
            RefreshError::StorageWriteFailure(_) => "STORAGE_WRITE_FAILURE",
        }
    }
}

impl From<UpstreamError> for RefreshError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::ConfigMissing { field } => RefreshError::ConfigMissing { field },
            timeout @ UpstreamError::Timeout { .. } => RefreshError::UpstreamTimeout(timeout),
            other => RefreshError::Upstream(other),
        }
    }
}

impl From<StorageError> for RefreshError {
    fn from(err: StorageError) -> Self {
        RefreshError::StorageWriteFailure(err)
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! DUET Core - Report Types
//!
//! Pure data structures shared by every DUET crate: the combined report
//! artifact, refresh run state, run log entries and the error taxonomy.
//! This crate contains no I/O.

use chrono::{DateTime, Utc};

pub mod artifact;
pub mod error;
pub mod run;

pub use artifact::{
    CombinedReport, CombinedReportArtifact, FileDescriptor, ReportMeta, ReportRecord, ReportRow,
    SourceCounts, SourceDurations, SourceReport,
};
pub use error::{ConfigError, RefreshError, StorageError, UpstreamError};
pub use run::{RefreshRunState, RunLogEntry};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds, as reported in `sourceDurationsMs`.
pub type DurationMs = u64;

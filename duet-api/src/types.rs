//! API Request and Response Types
//!
//! Wire shapes of the DUET REST endpoints. Field names are camelCase on the
//! wire.

use duet_core::{
    FileDescriptor, ReportMeta, ReportRecord, RunLogEntry, SourceCounts, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::services::{CacheRead, RefreshOutcome};

// ============================================================================
// COMBINED REPORT
// ============================================================================

/// Query flags of `GET /cache/combined-report`.
///
/// Both accept `1` or `true`. The read never mutates, so `read_only` only
/// documents the caller's intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct CombinedReportQuery {
    #[serde(default)]
    pub latest: Option<String>,
    #[serde(default)]
    pub read_only: Option<String>,
}

impl CombinedReportQuery {
    pub fn wants_latest(&self) -> bool {
        is_truthy(self.latest.as_deref())
    }

    pub fn is_read_only(&self) -> bool {
        is_truthy(self.read_only.as_deref())
    }
}

fn is_truthy(flag: Option<&str>) -> bool {
    matches!(
        flag.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true")
    )
}

/// Body of `GET /cache/combined-report`.
///
/// One of three shapes:
/// - `{ ok: true, hasFile: true, file, meta, data, totalRecords, sources }`
/// - `{ ok: true, hasFile: false }`
/// - `{ ok: false, error, reason }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CombinedReportResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_file: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ReportMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<ReportRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<SourceCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CombinedReportResponse {
    fn empty(ok: bool) -> Self {
        Self {
            ok,
            has_file: None,
            file: None,
            meta: None,
            data: None,
            total_records: None,
            sources: None,
            error: None,
            reason: None,
        }
    }

    pub fn no_cache_yet() -> Self {
        Self {
            has_file: Some(false),
            ..Self::empty(true)
        }
    }

    pub fn read_failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some("Failed to read the combined report cache".to_string()),
            reason: Some(reason.into()),
            ..Self::empty(false)
        }
    }
}

impl From<CacheRead> for CombinedReportResponse {
    fn from(read: CacheRead) -> Self {
        match read {
            CacheRead::Present(artifact) => {
                let total_records = artifact.total_records();
                let sources = artifact.sources();
                let artifact = *artifact;
                Self {
                    has_file: Some(true),
                    file: Some(artifact.file),
                    meta: Some(artifact.meta),
                    data: Some(artifact.records),
                    total_records: Some(total_records),
                    sources: Some(sources),
                    ..Self::empty(true)
                }
            }
            CacheRead::Absent => Self::no_cache_yet(),
            CacheRead::Failed(e) => Self::read_failed(e.to_string()),
        }
    }
}

// ============================================================================
// REFRESH
// ============================================================================

/// Body of `POST /refresh`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    /// Error kind (`CONFIG_MISSING`, `UPSTREAM_TIMEOUT`, ...) on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ReportMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileDescriptor>,
    /// Start time of the run in flight when the trigger was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub started_at: Option<Timestamp>,
}

impl From<&RefreshOutcome> for RefreshResponse {
    fn from(outcome: &RefreshOutcome) -> Self {
        match outcome {
            RefreshOutcome::Success { meta, file } => Self {
                success: true,
                message: format!(
                    "Combined report refreshed: {} records",
                    meta.counts().total()
                ),
                error: None,
                meta: Some(meta.clone()),
                file: Some(file.clone()),
                started_at: None,
            },
            RefreshOutcome::AlreadyRunning { started_at } => Self {
                success: false,
                message: "A refresh is already running".to_string(),
                error: None,
                meta: None,
                file: None,
                started_at: Some(*started_at),
            },
            RefreshOutcome::Failure { reason } => Self {
                success: false,
                message: reason.to_string(),
                error: Some(reason.kind().to_string()),
                meta: None,
                file: None,
                started_at: None,
            },
        }
    }
}

// ============================================================================
// RUN LOG
// ============================================================================

/// Body of `GET /cache/combined-report/log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LogResponse {
    /// `"<RFC3339 timestamp> <message>"`, oldest first.
    pub log: Vec<String>,
}

impl LogResponse {
    pub fn from_entries(entries: &[RunLogEntry]) -> Self {
        Self {
            log: entries.iter().map(RunLogEntry::render).collect(),
        }
    }
}

// ============================================================================
// ACTIVE SELECTION
// ============================================================================

/// Body of `GET|PUT /user/active-acompanhamento`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ActiveSelectionBody {
    /// `null` clears the selection.
    #[serde(default)]
    pub active_acompanhamento_id: Option<String>,
}

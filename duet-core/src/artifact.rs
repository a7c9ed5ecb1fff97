//! Combined report artifact.
//!
//! The durable cache unit is built from the rows of two upstream reports.
//! Every row is tagged with the report it came from and the rows keep
//! upstream order: all report-134 rows first, then all report-151 rows.
//!
//! The persisted document is a [`CombinedReport`] (`records` + `meta`).
//! Readers receive a [`CombinedReportArtifact`], which adds the
//! [`FileDescriptor`] describing the stored document itself.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::{DurationMs, Timestamp};

/// A single upstream row: an opaque JSON object.
pub type ReportRow = Map<String, Value>;

/// Field name used to tag a record with its source report.
pub const SOURCE_REPORT_FIELD: &str = "sourceReport";

// ============================================================================
// SOURCE REPORT
// ============================================================================

/// The two upstream reports that make up the combined dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum SourceReport {
    #[serde(rename = "report134")]
    Report134,
    #[serde(rename = "report151")]
    Report151,
}

impl SourceReport {
    /// Both reports, in merge order.
    pub const ALL: [SourceReport; 2] = [SourceReport::Report134, SourceReport::Report151];

    /// Numeric report identifier used by the upstream generator.
    pub fn report_id(&self) -> u32 {
        match self {
            SourceReport::Report134 => 134,
            SourceReport::Report151 => 151,
        }
    }

    /// Tag value written into `sourceReport`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceReport::Report134 => "report134",
            SourceReport::Report151 => "report151",
        }
    }
}

impl fmt::Display for SourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// An upstream row tagged with its source report.
///
/// The row's own fields are kept verbatim next to the tag when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub source_report: SourceReport,
    #[serde(flatten)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub fields: ReportRow,
}

impl ReportRecord {
    /// Tag a row. An upstream `sourceReport` field is replaced by the tag.
    pub fn tagged(source_report: SourceReport, mut fields: ReportRow) -> Self {
        fields.remove(SOURCE_REPORT_FIELD);
        Self {
            source_report,
            fields,
        }
    }
}

/// Per-source row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SourceCounts {
    pub report134_count: usize,
    pub report151_count: usize,
}

impl SourceCounts {
    pub fn total(&self) -> usize {
        self.report134_count + self.report151_count
    }
}

/// Wall-clock time spent fetching each report, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SourceDurations {
    pub report134: DurationMs,
    pub report151: DurationMs,
}

/// Metadata stored alongside the merged records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    pub report134_count: usize,
    pub report151_count: usize,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub generated_at: Timestamp,
    pub source_durations_ms: SourceDurations,
}

impl ReportMeta {
    pub fn counts(&self) -> SourceCounts {
        SourceCounts {
            report134_count: self.report134_count,
            report151_count: self.report151_count,
        }
    }
}

// ============================================================================
// COMBINED REPORT
// ============================================================================

/// The persisted document: merged records plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CombinedReport {
    pub records: Vec<ReportRecord>,
    pub meta: ReportMeta,
}

impl CombinedReport {
    /// Merge both reports by concatenation.
    ///
    /// Report-134 rows come first, each group keeps upstream order, and the
    /// per-source counts are taken from the inputs.
    pub fn merge(
        report134: Vec<ReportRow>,
        report151: Vec<ReportRow>,
        durations: SourceDurations,
        generated_at: Timestamp,
    ) -> Self {
        let meta = ReportMeta {
            report134_count: report134.len(),
            report151_count: report151.len(),
            generated_at,
            source_durations_ms: durations,
        };

        let mut records = Vec::with_capacity(report134.len() + report151.len());
        records.extend(
            report134
                .into_iter()
                .map(|row| ReportRecord::tagged(SourceReport::Report134, row)),
        );
        records.extend(
            report151
                .into_iter()
                .map(|row| ReportRecord::tagged(SourceReport::Report151, row)),
        );

        Self { records, meta }
    }

    pub fn total_records(&self) -> usize {
        self.records.len()
    }

    /// Check `records.len() == report134Count + report151Count`.
    pub fn verify_counts(&self) -> Result<(), StorageError> {
        let expected = self.meta.counts().total();
        if self.records.len() == expected {
            Ok(())
        } else {
            Err(StorageError::CountMismatch {
                records: self.records.len(),
                report134_count: self.meta.report134_count,
                report151_count: self.meta.report151_count,
            })
        }
    }
}

/// Identity and freshness descriptor of the stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub name: String,
    /// Byte length of the persisted document.
    pub size: u64,
    /// Equal to `meta.generatedAt`.
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub universal_last_update: Timestamp,
}

/// The cached artifact as seen by readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CombinedReportArtifact {
    pub records: Vec<ReportRecord>,
    pub meta: ReportMeta,
    pub file: FileDescriptor,
}

impl CombinedReportArtifact {
    /// Attach a file descriptor to a stored report.
    pub fn new(report: CombinedReport, file: FileDescriptor) -> Self {
        Self {
            records: report.records,
            meta: report.meta,
            file,
        }
    }

    pub fn total_records(&self) -> usize {
        self.records.len()
    }

    pub fn sources(&self) -> SourceCounts {
        self.meta.counts()
    }
}

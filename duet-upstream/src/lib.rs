//! DUET Upstream - Report Source Layer
//!
//! Provider-agnostic trait for the two upstream report feeds, plus the
//! HTTP implementation used in production. The report generator itself is
//! opaque: a feed either returns an ordered sequence of rows or fails.

use async_trait::async_trait;
use duet_core::{ReportRow, SourceReport, UpstreamError};

pub mod config;
pub mod http;
pub mod rows;

pub use config::{UpstreamConfig, DEFAULT_UPSTREAM_TIMEOUT_SECS};
pub use http::HttpReportClient;
pub use rows::extract_rows;

// ============================================================================
// REPORT SOURCE TRAIT
// ============================================================================

/// Trait for upstream report feeds.
/// Implementations must be thread-safe (Send + Sync).
///
/// # Example
/// ```ignore
/// struct StaticSource { rows: Vec<ReportRow> }
///
/// #[async_trait]
/// impl ReportSource for StaticSource {
///     async fn fetch_report(&self, report: SourceReport) -> Result<Vec<ReportRow>, UpstreamError> {
///         Ok(self.rows.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Fail fast when the source cannot possibly succeed.
    ///
    /// Called before any fetch is started. Implementations that need
    /// credentials return `UpstreamError::ConfigMissing` here so that no
    /// network I/O happens for an unconfigured source.
    fn ensure_configured(&self) -> Result<(), UpstreamError> {
        Ok(())
    }

    /// Fetch all rows of one report, in upstream order.
    async fn fetch_report(&self, report: SourceReport) -> Result<Vec<ReportRow>, UpstreamError>;

    /// Fetch report 134.
    async fn fetch_report134(&self) -> Result<Vec<ReportRow>, UpstreamError> {
        self.fetch_report(SourceReport::Report134).await
    }

    /// Fetch report 151.
    async fn fetch_report151(&self) -> Result<Vec<ReportRow>, UpstreamError> {
        self.fetch_report(SourceReport::Report151).await
    }
}

#[async_trait]
impl<T: ReportSource + ?Sized> ReportSource for std::sync::Arc<T> {
    fn ensure_configured(&self) -> Result<(), UpstreamError> {
        (**self).ensure_configured()
    }

    async fn fetch_report(&self, report: SourceReport) -> Result<Vec<ReportRow>, UpstreamError> {
        (**self).fetch_report(report).await
    }
}

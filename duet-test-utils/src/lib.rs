//! DUET Test Utilities
//!
//! Shared test infrastructure for the DUET workspace:
//! - Row fixtures and sample reports
//! - Proptest generators for upstream rows
//! - A scriptable fake upstream (`FakeReportSource`)
//! - A cache store whose writes always fail (`FailingArtifactStore`)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

pub use duet_core::{
    CombinedReport, CombinedReportArtifact, FileDescriptor, ReportMeta, ReportRecord, ReportRow,
    SourceCounts, SourceDurations, SourceReport, StorageError, UpstreamError,
};
use duet_storage::{ArtifactStore, InMemoryArtifactStore};
use duet_upstream::ReportSource;

// ============================================================================
// FAKE REPORT SOURCE
// ============================================================================

#[derive(Debug, Default)]
struct FeedScript {
    rows: Vec<ReportRow>,
    failure: Option<UpstreamError>,
    delay: Option<Duration>,
}

/// Scriptable in-process upstream.
///
/// Each feed returns its configured rows, or its scripted failure, after an
/// optional delay. A gated source blocks every fetch until the gate opens.
#[derive(Debug, Clone)]
pub struct FakeReportSource {
    report134: Arc<Mutex<FeedScript>>,
    report151: Arc<Mutex<FeedScript>>,
    missing_config: Option<String>,
    fetches134: Arc<AtomicUsize>,
    fetches151: Arc<AtomicUsize>,
    started: Arc<Notify>,
    gate: Option<watch::Receiver<bool>>,
}

/// Releases the fetches of a gated [`FakeReportSource`].
#[derive(Debug)]
pub struct FetchGate {
    tx: watch::Sender<bool>,
}

impl FetchGate {
    pub fn open(&self) {
        self.tx.send_replace(true);
    }
}

impl FakeReportSource {
    /// Source returning `n134` and `n151` generated rows.
    pub fn with_rows(n134: usize, n151: usize) -> Self {
        Self::from_rows(
            fixtures::make_rows(n134, "r134"),
            fixtures::make_rows(n151, "r151"),
        )
    }

    pub fn from_rows(report134: Vec<ReportRow>, report151: Vec<ReportRow>) -> Self {
        Self {
            report134: Arc::new(Mutex::new(FeedScript {
                rows: report134,
                ..FeedScript::default()
            })),
            report151: Arc::new(Mutex::new(FeedScript {
                rows: report151,
                ..FeedScript::default()
            })),
            missing_config: None,
            fetches134: Arc::new(AtomicUsize::new(0)),
            fetches151: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(Notify::new()),
            gate: None,
        }
    }

    /// Make every fetch wait until the returned gate is opened.
    pub fn gated(mut self) -> (Self, FetchGate) {
        let (tx, rx) = watch::channel(false);
        self.gate = Some(rx);
        (self, FetchGate { tx })
    }

    /// Report `ConfigMissing { field }` before any fetch.
    pub fn unconfigured(mut self, field: impl Into<String>) -> Self {
        self.missing_config = Some(field.into());
        self
    }

    pub fn fail(self, report: SourceReport, error: UpstreamError) -> Self {
        self.set_failure(report, Some(error));
        self
    }

    pub fn delay(self, report: SourceReport, delay: Duration) -> Self {
        self.script(report).delay = Some(delay);
        self
    }

    /// Replace the failure of a feed on an existing (possibly shared) source.
    pub fn set_failure(&self, report: SourceReport, error: Option<UpstreamError>) {
        self.script(report).failure = error;
    }

    /// Replace the rows of a feed on an existing (possibly shared) source.
    pub fn set_rows(&self, report: SourceReport, rows: Vec<ReportRow>) {
        self.script(report).rows = rows;
    }

    pub fn fetch_count(&self, report: SourceReport) -> usize {
        self.counter(report).load(Ordering::SeqCst)
    }

    /// Total fetches across both feeds.
    pub fn total_fetches(&self) -> usize {
        self.fetch_count(SourceReport::Report134) + self.fetch_count(SourceReport::Report151)
    }

    /// Wait until at least one fetch has started since the last call.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    fn script(&self, report: SourceReport) -> std::sync::MutexGuard<'_, FeedScript> {
        let feed = match report {
            SourceReport::Report134 => &self.report134,
            SourceReport::Report151 => &self.report151,
        };
        feed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn counter(&self, report: SourceReport) -> &AtomicUsize {
        match report {
            SourceReport::Report134 => &self.fetches134,
            SourceReport::Report151 => &self.fetches151,
        }
    }
}

#[async_trait]
impl ReportSource for FakeReportSource {
    fn ensure_configured(&self) -> Result<(), UpstreamError> {
        match &self.missing_config {
            Some(field) => Err(UpstreamError::ConfigMissing {
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn fetch_report(&self, report: SourceReport) -> Result<Vec<ReportRow>, UpstreamError> {
        self.counter(report).fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        if let Some(mut gate) = self.gate.clone() {
            // A dropped gate counts as open.
            let _ = gate.wait_for(|open| *open).await;
        }

        let delay = self.script(report).delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.script(report);
        match &script.failure {
            Some(error) => Err(error.clone()),
            None => Ok(script.rows.clone()),
        }
    }
}

// ============================================================================
// FAILING ARTIFACT STORE
// ============================================================================

/// Cache store whose writes always fail; reads see the wrapped store.
#[derive(Debug, Clone, Default)]
pub struct FailingArtifactStore {
    inner: InMemoryArtifactStore,
    writes_attempted: Arc<AtomicUsize>,
}

impl FailingArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing artifact that must survive failed writes.
    pub fn with_report(report: CombinedReport) -> Result<Self, StorageError> {
        Ok(Self {
            inner: InMemoryArtifactStore::with_report(report)?,
            writes_attempted: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn writes_attempted(&self) -> usize {
        self.writes_attempted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for FailingArtifactStore {
    async fn write(&self, _report: &CombinedReport) -> Result<FileDescriptor, StorageError> {
        self.writes_attempted.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::WriteFailed {
            path: "memory".to_string(),
            reason: "disk full".to_string(),
        })
    }

    async fn read_latest(&self) -> Result<Option<CombinedReportArtifact>, StorageError> {
        self.inner.read_latest().await
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    /// `n` rows shaped like upstream report rows, ids prefixed by `prefix`.
    pub fn make_rows(n: usize, prefix: &str) -> Vec<ReportRow> {
        (0..n)
            .map(|i| {
                let value = json!({
                    "id": format!("{}-{}", prefix, i),
                    "acompanhamento": format!("ACC-{:05}", i),
                    "valor": i as f64 * 10.5,
                    "status": if i % 2 == 0 { "aberto" } else { "fechado" },
                });
                match value {
                    Value::Object(map) => map,
                    _ => ReportRow::new(),
                }
            })
            .collect()
    }

    /// Merged report with `n134` + `n151` rows and a fixed generation time.
    pub fn sample_report(n134: usize, n151: usize) -> CombinedReport {
        CombinedReport::merge(
            make_rows(n134, "r134"),
            make_rows(n151, "r151"),
            SourceDurations {
                report134: 1200,
                report151: 800,
            },
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
        )
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// A flat upstream row with a handful of scalar fields.
    pub fn arb_row() -> impl Strategy<Value = ReportRow> {
        proptest::collection::btree_map(
            "[a-z][a-zA-Z0-9]{0,11}",
            prop_oneof![
                any::<i64>().prop_map(Value::from),
                "[ -~]{0,24}".prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
                Just(Value::Null),
            ],
            0..6,
        )
        .prop_map(|fields| fields.into_iter().collect::<ReportRow>())
    }

    pub fn arb_rows(max: usize) -> impl Strategy<Value = Vec<ReportRow>> {
        proptest::collection::vec(arb_row(), 0..=max)
    }

    pub fn arb_source_report() -> impl Strategy<Value = SourceReport> {
        prop_oneof![Just(SourceReport::Report134), Just(SourceReport::Report151)]
    }
}

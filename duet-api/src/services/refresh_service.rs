//! Refresh Service
//!
//! The refresh coordinator: fetches both upstream reports, merges them and
//! hands the result to the cache store, with at most one run in flight.
//!
//! A run moves through:
//!
//! 1. Claim the run state (`Idle -> Running`), or report `AlreadyRunning`.
//! 2. Fail fast when the upstream source is not configured.
//! 3. Fetch report 134 and report 151 (concurrently or in sequence).
//! 4. Merge and write the artifact atomically.
//! 5. Release the run state, whatever happened above.
//!
//! Every step is appended to the run log and mirrored to `tracing`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use duet_core::{
    CombinedReport, DurationMs, FileDescriptor, RefreshError, ReportMeta, ReportRow, RunLogEntry,
    SourceDurations, SourceReport, Timestamp, UpstreamError,
};
use duet_storage::{
    ArtifactStore, InMemoryRunLog, LocalRunState, RunGuard, RunLogSink, RunStateCell,
};
use duet_upstream::ReportSource;

use crate::config::FetchMode;
use crate::telemetry::METRICS;

// ============================================================================
// OUTCOME
// ============================================================================

/// Result of one refresh attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Both reports fetched, merged and written.
    Success {
        meta: ReportMeta,
        file: FileDescriptor,
    },

    /// Another run was in flight; nothing was fetched.
    AlreadyRunning { started_at: Timestamp },

    /// The run failed; the previous artifact is untouched.
    Failure { reason: RefreshError },
}

impl RefreshOutcome {
    /// Metric label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Success { .. } => "success",
            RefreshOutcome::AlreadyRunning { .. } => "already_running",
            RefreshOutcome::Failure { reason } => reason.kind(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Success { .. })
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Single-flight refresh coordinator.
///
/// Cloning is cheap and clones share the same run state, so every trigger
/// (HTTP, scheduled job) must go through clones of one coordinator.
#[derive(Clone)]
pub struct RefreshCoordinator {
    source: Arc<dyn ReportSource>,
    store: Arc<dyn ArtifactStore>,
    run_state: Arc<dyn RunStateCell>,
    run_log: Arc<dyn RunLogSink>,
    fetch_mode: FetchMode,
}

impl RefreshCoordinator {
    /// Coordinator with a process-local run state and a default-sized run log.
    pub fn new(source: Arc<dyn ReportSource>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            source,
            store,
            run_state: Arc::new(LocalRunState::new()),
            run_log: Arc::new(InMemoryRunLog::default()),
            fetch_mode: FetchMode::default(),
        }
    }

    pub fn with_run_state(mut self, run_state: Arc<dyn RunStateCell>) -> Self {
        self.run_state = run_state;
        self
    }

    pub fn with_run_log(mut self, run_log: Arc<dyn RunLogSink>) -> Self {
        self.run_log = run_log;
        self
    }

    pub fn with_fetch_mode(mut self, fetch_mode: FetchMode) -> Self {
        self.fetch_mode = fetch_mode;
        self
    }

    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        Arc::clone(&self.store)
    }

    pub fn run_state(&self) -> Arc<dyn RunStateCell> {
        Arc::clone(&self.run_state)
    }

    pub fn run_log(&self) -> Arc<dyn RunLogSink> {
        Arc::clone(&self.run_log)
    }

    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    /// Run one refresh.
    ///
    /// Never returns an error: failures are reported as
    /// [`RefreshOutcome::Failure`] after the run state is released.
    pub async fn run_refresh(&self) -> RefreshOutcome {
        let timer = Instant::now();

        let guard = match RunGuard::acquire(Arc::clone(&self.run_state), Utc::now()) {
            Ok(guard) => guard,
            Err(started_at) => {
                self.log(format!(
                    "Refresh skipped: a run started at {} is still in progress",
                    started_at.to_rfc3339()
                ));
                tracing::info!(started_at = %started_at, "Refresh already running");
                let outcome = RefreshOutcome::AlreadyRunning { started_at };
                record_outcome(&outcome, timer);
                return outcome;
            }
        };

        self.log(format!(
            "Refresh started ({} fetch)",
            match self.fetch_mode {
                FetchMode::Concurrent => "concurrent",
                FetchMode::Sequential => "sequential",
            }
        ));
        tracing::info!(started_at = %guard.started_at(), fetch_mode = ?self.fetch_mode, "Refresh started");

        let outcome = match self.execute().await {
            Ok((meta, file)) => {
                self.log(format!(
                    "Refresh completed: {} records (report134: {}, report151: {}) written to {} ({} bytes)",
                    meta.counts().total(),
                    meta.report134_count,
                    meta.report151_count,
                    file.name,
                    file.size
                ));
                tracing::info!(
                    records = meta.counts().total(),
                    report134 = meta.report134_count,
                    report151 = meta.report151_count,
                    bytes = file.size,
                    "Refresh completed"
                );
                RefreshOutcome::Success { meta, file }
            }
            Err(reason) => {
                self.log(format!("Refresh failed [{}]: {}", reason.kind(), reason));
                tracing::error!(kind = reason.kind(), error = %reason, "Refresh failed");
                RefreshOutcome::Failure { reason }
            }
        };

        drop(guard);
        record_outcome(&outcome, timer);
        outcome
    }

    async fn execute(&self) -> Result<(ReportMeta, FileDescriptor), RefreshError> {
        self.source.ensure_configured()?;

        let ((rows134, ms134), (rows151, ms151)) = match self.fetch_mode {
            // try_join! drops the sibling future on the first failure.
            FetchMode::Concurrent => tokio::try_join!(
                self.timed_fetch(SourceReport::Report134),
                self.timed_fetch(SourceReport::Report151)
            )?,
            FetchMode::Sequential => {
                let first = self.timed_fetch(SourceReport::Report134).await?;
                let second = self.timed_fetch(SourceReport::Report151).await?;
                (first, second)
            }
        };

        let report = CombinedReport::merge(
            rows134,
            rows151,
            SourceDurations {
                report134: ms134,
                report151: ms151,
            },
            Utc::now(),
        );

        let file = self.store.write(&report).await?;
        Ok((report.meta, file))
    }

    async fn timed_fetch(
        &self,
        report: SourceReport,
    ) -> Result<(Vec<ReportRow>, DurationMs), UpstreamError> {
        let start = Instant::now();
        let result = self.source.fetch_report(report).await;
        let elapsed = start.elapsed();

        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_upstream_fetch(report.as_str(), result.is_ok(), elapsed.as_secs_f64());
        }

        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(rows) => {
                self.log(format!(
                    "Fetched {}: {} rows in {} ms",
                    report,
                    rows.len(),
                    elapsed_ms
                ));
                tracing::debug!(report = %report, rows = rows.len(), elapsed_ms, "Upstream report fetched");
                Ok((rows, elapsed_ms))
            }
            Err(e) => {
                tracing::warn!(report = %report, error = %e, elapsed_ms, "Upstream report failed");
                Err(e)
            }
        }
    }

    fn log(&self, message: String) {
        self.run_log.append(RunLogEntry::new(Utc::now(), message));
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("run_state", &self.run_state.current())
            .field("fetch_mode", &self.fetch_mode)
            .finish_non_exhaustive()
    }
}

fn record_outcome(outcome: &RefreshOutcome, timer: Instant) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_refresh(outcome.label(), timer.elapsed().as_secs_f64());
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use duet_core::RefreshRunState;
    use duet_storage::InMemoryArtifactStore;
    use duet_test_utils::{fixtures, FailingArtifactStore, FakeReportSource};
    use std::time::Duration;

    fn coordinator(
        source: FakeReportSource,
        store: Arc<dyn ArtifactStore>,
    ) -> (RefreshCoordinator, Arc<InMemoryRunLog>) {
        let log = Arc::new(InMemoryRunLog::new(100));
        let coordinator = RefreshCoordinator::new(Arc::new(source), store)
            .with_run_log(log.clone());
        (coordinator, log)
    }

    fn upstream_failure(report: SourceReport) -> UpstreamError {
        UpstreamError::RequestFailed {
            report,
            status: 500,
            message: "report generator crashed".to_string(),
        }
    }

    #[tokio::test]
    async fn test_refresh_merges_both_reports() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let (coordinator, _) = coordinator(FakeReportSource::with_rows(1200, 340), store.clone());

        let outcome = coordinator.run_refresh().await;
        let RefreshOutcome::Success { meta, file } = outcome else {
            panic!("expected success, got {:?}", outcome);
        };
        assert_eq!(meta.report134_count, 1200);
        assert_eq!(meta.report151_count, 340);
        assert_eq!(file.universal_last_update, meta.generated_at);

        let artifact = store
            .read_latest()
            .await
            .expect("read should succeed")
            .expect("artifact should exist");
        assert_eq!(artifact.total_records(), 1540);
        assert_eq!(artifact.records[0].source_report, SourceReport::Report134);
        assert_eq!(artifact.records[1200].source_report, SourceReport::Report151);
        assert_eq!(coordinator.run_state().current(), RefreshRunState::Idle);
    }

    #[tokio::test]
    async fn test_second_trigger_while_running_is_rejected() {
        let (source, gate) = FakeReportSource::with_rows(3, 2).gated();
        let store = Arc::new(InMemoryArtifactStore::new());
        let (coordinator, _) = coordinator(source.clone(), store);

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run_refresh().await })
        };
        source.wait_started().await;
        assert!(coordinator.run_state().current().is_running());

        let second = coordinator.run_refresh().await;
        assert_eq!(second.label(), "already_running");

        gate.open();
        let first = first.await.expect("first run should join");
        assert!(first.is_success());
        assert_eq!(source.fetch_count(SourceReport::Report134), 1);
        assert_eq!(source.fetch_count(SourceReport::Report151), 1);
        assert_eq!(coordinator.run_state().current(), RefreshRunState::Idle);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_artifact() {
        let store = Arc::new(
            InMemoryArtifactStore::with_report(fixtures::sample_report(2, 1))
                .expect("sample report is consistent"),
        );
        let source = FakeReportSource::with_rows(10, 10)
            .fail(SourceReport::Report151, upstream_failure(SourceReport::Report151));
        let (coordinator, _) = coordinator(source, store.clone());

        let outcome = coordinator.run_refresh().await;
        assert_eq!(outcome.label(), "UPSTREAM_ERROR");

        let artifact = store
            .read_latest()
            .await
            .expect("read should succeed")
            .expect("previous artifact should remain");
        assert_eq!(artifact.total_records(), 3);
        assert_eq!(coordinator.run_state().current(), RefreshRunState::Idle);
    }

    #[tokio::test]
    async fn test_failed_fetch_on_fresh_store_leaves_it_empty() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let source = FakeReportSource::with_rows(5, 5)
            .fail(SourceReport::Report134, upstream_failure(SourceReport::Report134));
        let (coordinator, _) = coordinator(source, store.clone());

        assert!(!coordinator.run_refresh().await.is_success());
        assert!(store.read_latest().await.expect("read should succeed").is_none());
    }

    #[tokio::test]
    async fn test_missing_config_fails_before_fetching() {
        let source = FakeReportSource::with_rows(1, 1).unconfigured("DUET_UPSTREAM_TOKEN");
        let store = Arc::new(InMemoryArtifactStore::new());
        let (coordinator, _) = coordinator(source.clone(), store);

        let outcome = coordinator.run_refresh().await;
        assert_eq!(
            outcome,
            RefreshOutcome::Failure {
                reason: RefreshError::ConfigMissing {
                    field: "DUET_UPSTREAM_TOKEN".to_string()
                }
            }
        );
        assert_eq!(source.total_fetches(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_timeout() {
        let source = FakeReportSource::with_rows(1, 1).fail(
            SourceReport::Report134,
            UpstreamError::Timeout {
                report: SourceReport::Report134,
                timeout_secs: 1800,
            },
        );
        let (coordinator, _) = coordinator(source, Arc::new(InMemoryArtifactStore::new()));

        assert_eq!(coordinator.run_refresh().await.label(), "UPSTREAM_TIMEOUT");
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_previous_artifact() {
        let store = Arc::new(
            FailingArtifactStore::with_report(fixtures::sample_report(4, 4))
                .expect("sample report is consistent"),
        );
        let (coordinator, log) = coordinator(FakeReportSource::with_rows(7, 7), store.clone());

        let outcome = coordinator.run_refresh().await;
        assert_eq!(outcome.label(), "STORAGE_WRITE_FAILURE");
        assert_eq!(store.writes_attempted(), 1);

        let artifact = store
            .read_latest()
            .await
            .expect("read should succeed")
            .expect("previous artifact should remain");
        assert_eq!(artifact.total_records(), 8);

        let last = log.entries().pop().expect("log should not be empty");
        assert!(last.message.contains("[STORAGE_WRITE_FAILURE]"));
    }

    #[tokio::test]
    async fn test_sequential_mode_stops_after_first_failure() {
        let source = FakeReportSource::with_rows(1, 1)
            .fail(SourceReport::Report134, upstream_failure(SourceReport::Report134));
        let (coordinator, _) = coordinator(source.clone(), Arc::new(InMemoryArtifactStore::new()));
        let coordinator = coordinator.with_fetch_mode(FetchMode::Sequential);

        assert!(!coordinator.run_refresh().await.is_success());
        assert_eq!(source.fetch_count(SourceReport::Report134), 1);
        assert_eq!(source.fetch_count(SourceReport::Report151), 0);
    }

    #[tokio::test]
    async fn test_concurrent_failure_cancels_slow_sibling() {
        let source = FakeReportSource::with_rows(1, 1)
            .fail(SourceReport::Report134, upstream_failure(SourceReport::Report134))
            .delay(SourceReport::Report151, Duration::from_secs(600));
        let (coordinator, _) = coordinator(source, Arc::new(InMemoryArtifactStore::new()));

        let outcome = tokio::time::timeout(Duration::from_secs(5), coordinator.run_refresh())
            .await
            .expect("failure should short-circuit the slow fetch");
        assert_eq!(outcome.label(), "UPSTREAM_ERROR");
    }

    #[tokio::test]
    async fn test_log_records_start_before_completion() {
        let (coordinator, log) = coordinator(
            FakeReportSource::with_rows(2, 2),
            Arc::new(InMemoryArtifactStore::new()),
        );

        assert!(coordinator.run_refresh().await.is_success());

        let entries = log.entries();
        assert!(entries.len() >= 2);
        assert!(entries[0].message.starts_with("Refresh started"));
        let last = entries.last().expect("log should not be empty");
        assert!(last.message.starts_with("Refresh completed: 4 records"));
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_cancelled_run_releases_run_state() {
        let (source, _gate) = FakeReportSource::with_rows(1, 1).gated();
        let (coordinator, _) = coordinator(source.clone(), Arc::new(InMemoryArtifactStore::new()));

        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run_refresh().await })
        };
        source.wait_started().await;
        assert!(coordinator.run_state().current().is_running());

        task.abort();
        assert!(task.await.is_err());
        assert_eq!(coordinator.run_state().current(), RefreshRunState::Idle);
    }
}

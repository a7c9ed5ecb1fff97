//! Scheduled Refresh Background Task
//!
//! Runs the refresh coordinator on a fixed interval. Scheduled runs go
//! through the same single-flight guard as manual triggers: a tick that
//! lands during a manual run yields `AlreadyRunning` and is only logged.
//! Missed ticks are skipped, never queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::services::{RefreshCoordinator, RefreshOutcome};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the scheduled refresh task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshScheduleConfig {
    /// Time between scheduled runs.
    pub interval: Duration,

    /// Run once right away instead of waiting a full interval.
    pub run_on_start: bool,
}

impl RefreshScheduleConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            run_on_start: false,
        }
    }

    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }
}

// ============================================================================
// COUNTERS
// ============================================================================

#[derive(Debug, Default)]
struct ScheduleCounters {
    ticks: AtomicU64,
    succeeded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl ScheduleCounters {
    fn record(&self, outcome: &RefreshOutcome) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            RefreshOutcome::Success { .. } => &self.succeeded,
            RefreshOutcome::AlreadyRunning { .. } => &self.skipped,
            RefreshOutcome::Failure { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RefreshScheduleSnapshot {
        RefreshScheduleSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// What the scheduled task did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshScheduleSnapshot {
    pub ticks: u64,
    pub succeeded: u64,
    /// Ticks that found a run already in flight.
    pub skipped: u64,
    pub failed: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that refreshes the combined report periodically.
///
/// Runs until the shutdown signal is set to `true` or its sender is dropped,
/// and returns what it did. A run in progress when shutdown arrives is
/// dropped: nothing is written before both fetches join, and the run guard
/// releases the run state on drop. Dropped runs are not counted.
pub async fn scheduled_refresh_task(
    coordinator: RefreshCoordinator,
    config: RefreshScheduleConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> RefreshScheduleSnapshot {
    let counters = ScheduleCounters::default();

    let start = if config.run_on_start {
        Instant::now()
    } else {
        Instant::now() + config.interval
    };
    let mut ticker = interval_at(start, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        run_on_start = config.run_on_start,
        "Scheduled refresh task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown_rx) => {
                tracing::info!("Scheduled refresh task shutting down");
                break;
            }

            _ = ticker.tick() => {
                let outcome = tokio::select! {
                    outcome = coordinator.run_refresh() => outcome,
                    _ = shutdown_requested(&mut shutdown_rx) => {
                        tracing::info!("Scheduled refresh interrupted by shutdown");
                        break;
                    }
                };
                match &outcome {
                    RefreshOutcome::Success { meta, .. } => tracing::info!(
                        records = meta.counts().total(),
                        "Scheduled refresh completed"
                    ),
                    RefreshOutcome::AlreadyRunning { started_at } => tracing::info!(
                        started_at = %started_at,
                        "Scheduled refresh skipped, run already in progress"
                    ),
                    RefreshOutcome::Failure { reason } => tracing::warn!(
                        kind = reason.kind(),
                        error = %reason,
                        "Scheduled refresh failed"
                    ),
                }
                counters.record(&outcome);
            }
        }
    }

    let snapshot = counters.snapshot();
    tracing::info!(
        ticks = snapshot.ticks,
        succeeded = snapshot.succeeded,
        skipped = snapshot.skipped,
        failed = snapshot.failed,
        "Scheduled refresh task completed"
    );
    snapshot
}

/// Resolves once the signal reads `true` or the sender is gone.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

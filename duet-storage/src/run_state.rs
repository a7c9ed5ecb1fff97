//! Single-flight run state.
//!
//! A [`RunStateCell`] holds `Idle | Running(startedAt)`. The coordinator
//! claims it with [`RunGuard::acquire`]; dropping the guard releases the
//! cell, so a run that returns, fails, panics or is cancelled always ends
//! back in `Idle`.

use std::sync::{Arc, Mutex};

use duet_core::{RefreshRunState, Timestamp};

/// Holder of the refresh run state.
///
/// The default [`LocalRunState`] is process-local. A shared implementation
/// (e.g. a lease in an external store) can be injected instead.
pub trait RunStateCell: Send + Sync {
    /// Transition `Idle -> Running(now)`.
    ///
    /// Returns `Err(started_at)` of the run in flight if already running.
    fn try_begin(&self, now: Timestamp) -> Result<(), Timestamp>;

    /// Transition back to `Idle`.
    fn finish(&self);

    /// Current state.
    fn current(&self) -> RefreshRunState;
}

/// Process-local run state behind a mutex.
#[derive(Debug, Default)]
pub struct LocalRunState {
    state: Mutex<RefreshRunState>,
}

impl LocalRunState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStateCell for LocalRunState {
    fn try_begin(&self, now: Timestamp) -> Result<(), Timestamp> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match *state {
            RefreshRunState::Running { started_at } => Err(started_at),
            RefreshRunState::Idle => {
                *state = RefreshRunState::Running { started_at: now };
                Ok(())
            }
        }
    }

    fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = RefreshRunState::Idle;
    }

    fn current(&self) -> RefreshRunState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Claim on a [`RunStateCell`]; releases it to `Idle` on drop.
pub struct RunGuard {
    cell: Arc<dyn RunStateCell>,
    started_at: Timestamp,
}

impl RunGuard {
    /// Claim the cell, or return the start time of the run in flight.
    pub fn acquire(cell: Arc<dyn RunStateCell>, now: Timestamp) -> Result<Self, Timestamp> {
        cell.try_begin(now)?;
        Ok(Self {
            cell,
            started_at: now,
        })
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.cell.finish();
    }
}

impl std::fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunGuard")
            .field("started_at", &self.started_at)
            .finish()
    }
}

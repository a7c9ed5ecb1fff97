//! Refresh run state and run log entries.

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// State of the single-flight refresh guard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RefreshRunState {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Running {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
        started_at: Timestamp,
    },
}

impl RefreshRunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RefreshRunState::Running { .. })
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        match self {
            RefreshRunState::Idle => None,
            RefreshRunState::Running { started_at } => Some(*started_at),
        }
    }
}

/// One line of the refresh run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: Timestamp,
    pub message: String,
}

impl RunLogEntry {
    pub fn new(timestamp: Timestamp, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }

    /// `"<RFC3339 timestamp> <message>"`, as served by the log endpoint.
    pub fn render(&self) -> String {
        format!("{} {}", self.timestamp.to_rfc3339(), self.message)
    }
}

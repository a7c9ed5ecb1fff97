//! Background Jobs for DUET API
//!
//! - `refresh_schedule`: Periodic combined report refresh
//!
//! # Usage
//!
//! ```ignore
//! use duet_api::jobs::{scheduled_refresh_task, RefreshScheduleConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let config = RefreshScheduleConfig::new(Duration::from_secs(6 * 3600));
//! tokio::spawn(scheduled_refresh_task(coordinator.clone(), config, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod refresh_schedule;

pub use refresh_schedule::{scheduled_refresh_task, RefreshScheduleConfig, RefreshScheduleSnapshot};

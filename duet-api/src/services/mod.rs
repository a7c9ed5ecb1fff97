//! Service Layer
//!
//! Refresh coordination and cache reads, kept free of HTTP concerns so the
//! routes and the scheduled job share them.

mod refresh_service;
mod report_service;

pub use refresh_service::*;
pub use report_service::*;

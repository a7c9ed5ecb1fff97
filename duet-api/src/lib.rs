//! DUET API - Combined Report Cache Service
//!
//! Axum service in front of the combined report cache:
//!
//! - `GET /cache/combined-report` serves the latest cached artifact and
//!   never triggers a refresh
//! - `POST /refresh` runs the single-flight refresh coordinator
//! - `GET /cache/combined-report/log` exposes the refresh run log
//! - `GET|PUT /user/active-acompanhamento` stores a per-user selection
//!
//! Plus health probes, Prometheus metrics, an optional scheduled refresh
//! job and (with the `openapi` feature) the OpenAPI document.

pub mod auth;
pub mod config;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use auth::{
    authenticate, authenticate_api_key, authenticate_jwt, generate_jwt_token, validate_api_key,
    validate_jwt_token, AuthConfig, AuthContext, AuthMethod, Claims,
};
pub use config::{ApiConfig, FetchMode, ServiceConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{scheduled_refresh_task, RefreshScheduleConfig};
pub use middleware::{auth_middleware, AuthExtractor, AuthMiddlewareState};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use services::{CacheRead, RefreshCoordinator, RefreshOutcome};
pub use state::AppState;
pub use types::*;

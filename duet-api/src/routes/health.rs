//! Probes under `/health`. Public, and none of them reaches upstream.
//!
//! `/ready` only fails when the cache store itself cannot be inspected. An
//! empty cache is ready, since the read path answers `hasFile: false`.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use duet_core::{RefreshRunState, Timestamp};

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    NotReady,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub status: Readiness,
    pub version: String,
    pub uptime_seconds: u64,
    pub cache: CacheProbe,
    pub refresh: RefreshProbe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CacheProbe {
    pub has_file: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RefreshProbe {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub started_at: Option<Timestamp>,
}

impl From<RefreshRunState> for RefreshProbe {
    fn from(state: RefreshRunState) -> Self {
        Self {
            running: state.is_running(),
            started_at: state.started_at(),
        }
    }
}

/// GET /health/ping
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses((status = 200, description = "pong", body = String)),
))]
pub async fn ping() -> &'static str {
    "pong"
}

/// GET /health/live
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 204, description = "Process is up")),
))]
pub async fn liveness() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET /health/ready
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready to serve reads", body = ReadinessReport),
        (status = 503, description = "Cache store cannot be inspected", body = ReadinessReport),
    ),
))]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    let (status, cache) = match state.store.has_artifact().await {
        Ok(has_file) => (Readiness::Ready, CacheProbe { has_file, error: None }),
        Err(e) => {
            tracing::warn!(error = %e, "readiness: cache store check failed");
            (
                Readiness::NotReady,
                CacheProbe {
                    has_file: false,
                    error: Some(e.to_string()),
                },
            )
        }
    };

    let code = match status {
        Readiness::Ready => StatusCode::OK,
        Readiness::NotReady => StatusCode::SERVICE_UNAVAILABLE,
    };
    let report = ReadinessReport {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cache,
        refresh: state.run_state.current().into(),
    };
    (code, Json(report))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

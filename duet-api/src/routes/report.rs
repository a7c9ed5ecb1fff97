//! Combined Report REST API Routes
//!
//! Read-only access to the cached combined report and the refresh run log.
//! Neither endpoint calls upstream or waits for an in-flight refresh.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use duet_storage::{ArtifactStore, RunLogSink};

use crate::services::{read_latest_report, CacheRead};
use crate::state::AppState;
use crate::types::{CombinedReportQuery, CombinedReportResponse, LogResponse};

/// Headers that keep browsers and proxies from caching the report.
const NO_CACHE_HEADERS: [(header::HeaderName, &str); 3] = [
    (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
    (header::PRAGMA, "no-cache"),
    (header::EXPIRES, "0"),
];

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /cache/combined-report - Latest cached artifact
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/cache/combined-report",
    tag = "Reports",
    params(CombinedReportQuery),
    responses(
        (status = 200, description = "Cached report, or hasFile: false when none exists", body = CombinedReportResponse),
        (status = 500, description = "Cache read failed", body = CombinedReportResponse),
    ),
))]
pub async fn get_combined_report(
    State(store): State<Arc<dyn ArtifactStore>>,
    Query(query): Query<CombinedReportQuery>,
) -> impl IntoResponse {
    tracing::debug!(
        latest = query.wants_latest(),
        read_only = query.is_read_only(),
        "Combined report requested"
    );

    let read = read_latest_report(store.as_ref()).await;
    let status = match read {
        CacheRead::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CacheRead::Present(_) | CacheRead::Absent => StatusCode::OK,
    };

    (status, NO_CACHE_HEADERS, Json(CombinedReportResponse::from(read)))
}

/// GET /cache/combined-report/log - Refresh run log, oldest first
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/cache/combined-report/log",
    tag = "Reports",
    responses(
        (status = 200, description = "Run log entries", body = LogResponse),
    ),
))]
pub async fn get_run_log(State(run_log): State<Arc<dyn RunLogSink>>) -> impl IntoResponse {
    (
        NO_CACHE_HEADERS,
        Json(LogResponse::from_entries(&run_log.entries())),
    )
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the report cache router (no auth required).
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/combined-report", get(get_combined_report))
        .route("/combined-report/log", get(get_run_log))
}

//! Refresh REST API Routes
//!
//! Manual refresh trigger. The run executes on its own task, so a client
//! that disconnects mid-request does not cancel the refresh.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::middleware::AuthExtractor;
use crate::services::{RefreshCoordinator, RefreshOutcome};
use crate::state::AppState;
use crate::types::RefreshResponse;

/// HTTP status for a refresh outcome.
///
/// `AlreadyRunning` is a coordination signal and answers 200.
pub fn refresh_status(outcome: &RefreshOutcome) -> StatusCode {
    match outcome {
        RefreshOutcome::Success { .. } | RefreshOutcome::AlreadyRunning { .. } => StatusCode::OK,
        RefreshOutcome::Failure { reason } => ErrorCode::from(reason).status_code(),
    }
}

/// POST /refresh - Fetch both reports and replace the cache
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/refresh",
    tag = "Reports",
    responses(
        (status = 200, description = "Refreshed, or success: false when a run is already in progress", body = RefreshResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Upstream configuration missing or cache write failed", body = RefreshResponse),
        (status = 502, description = "Upstream report failed", body = RefreshResponse),
        (status = 504, description = "Upstream report timed out", body = RefreshResponse),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
))]
pub async fn trigger_refresh(
    State(coordinator): State<RefreshCoordinator>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<(StatusCode, Json<RefreshResponse>)> {
    tracing::info!(user_id = %auth.user_id, "Manual refresh requested");

    let outcome = tokio::spawn(async move { coordinator.run_refresh().await })
        .await
        .map_err(|e| ApiError::internal_error(format!("Refresh task failed: {}", e)))?;

    Ok((refresh_status(&outcome), Json(RefreshResponse::from(&outcome))))
}

/// Create the refresh router (requires auth middleware).
pub fn create_router() -> Router<AppState> {
    Router::new().route("/refresh", post(trigger_refresh))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use duet_core::{RefreshError, StorageError};

    #[test]
    fn test_refresh_status_mapping() {
        assert_eq!(
            refresh_status(&RefreshOutcome::AlreadyRunning {
                started_at: Utc::now()
            }),
            StatusCode::OK
        );
        assert_eq!(
            refresh_status(&RefreshOutcome::Failure {
                reason: RefreshError::ConfigMissing {
                    field: "DUET_UPSTREAM_BASE_URL".to_string()
                }
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            refresh_status(&RefreshOutcome::Failure {
                reason: RefreshError::StorageWriteFailure(StorageError::LockPoisoned)
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

//! User REST API Routes
//!
//! Per-user active selection pointer (`activeAcompanhamentoId`). Both
//! endpoints require authentication; the pointer is keyed by the caller's
//! user id and the last write wins.

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

use duet_storage::SelectionStore;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::state::AppState;
use crate::types::ActiveSelectionBody;

const MAX_SELECTION_ID_LEN: usize = 256;

/// Trim the id and reject blank or oversized values.
fn normalize_selection(id: Option<String>) -> ApiResult<Option<String>> {
    match id {
        None => Ok(None),
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(ApiError::invalid_input(
                    "activeAcompanhamentoId must not be blank; send null to clear it",
                ));
            }
            if trimmed.len() > MAX_SELECTION_ID_LEN {
                return Err(ApiError::invalid_input(format!(
                    "activeAcompanhamentoId exceeds {} characters",
                    MAX_SELECTION_ID_LEN
                )));
            }
            Ok(Some(trimmed.to_string()))
        }
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /user/active-acompanhamento - Current selection of the caller
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/user/active-acompanhamento",
    tag = "Users",
    responses(
        (status = 200, description = "Current selection (null when unset)", body = ActiveSelectionBody),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
))]
pub async fn get_active_selection(
    State(selections): State<Arc<dyn SelectionStore>>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<Json<ActiveSelectionBody>> {
    let active_acompanhamento_id = selections.get(&auth.user_id).await?;
    Ok(Json(ActiveSelectionBody {
        active_acompanhamento_id,
    }))
}

/// PUT /user/active-acompanhamento - Replace the caller's selection
#[cfg_attr(feature = "openapi", utoipa::path(
    put,
    path = "/user/active-acompanhamento",
    tag = "Users",
    request_body = ActiveSelectionBody,
    responses(
        (status = 200, description = "Selection stored", body = ActiveSelectionBody),
        (status = 400, description = "Invalid selection", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(
        ("api_key" = []),
        ("bearer_auth" = [])
    )
))]
pub async fn put_active_selection(
    State(selections): State<Arc<dyn SelectionStore>>,
    AuthExtractor(auth): AuthExtractor,
    Json(body): Json<ActiveSelectionBody>,
) -> ApiResult<Json<ActiveSelectionBody>> {
    let selection = normalize_selection(body.active_acompanhamento_id)?;
    selections.set(&auth.user_id, selection.clone()).await?;

    tracing::debug!(user_id = %auth.user_id, cleared = selection.is_none(), "Active selection updated");
    Ok(Json(ActiveSelectionBody {
        active_acompanhamento_id: selection,
    }))
}

/// Create the user router (requires auth middleware).
pub fn create_router() -> Router<AppState> {
    Router::new().route(
        "/active-acompanhamento",
        get(get_active_selection).put(put_active_selection),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_selection() {
        assert_eq!(normalize_selection(None).ok(), Some(None));
        assert_eq!(
            normalize_selection(Some("  ACC-00007 ".to_string())).ok(),
            Some(Some("ACC-00007".to_string()))
        );
        assert!(normalize_selection(Some("   ".to_string())).is_err());
        assert!(normalize_selection(Some("x".repeat(MAX_SELECTION_ID_LEN + 1))).is_err());
    }
}

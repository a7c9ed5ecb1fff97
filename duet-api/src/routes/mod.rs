//! HTTP surface of the report cache service.

pub mod health;
pub mod refresh;
pub mod report;
pub mod user;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{auth_middleware, AuthMiddlewareState};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use health::create_router as health_router;
pub use refresh::create_router as refresh_router;
pub use report::create_router as report_router;
pub use user::create_router as user_router;

#[cfg(feature = "openapi")]
async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

fn is_production(environment: &str) -> bool {
    environment.eq_ignore_ascii_case("production") || environment.eq_ignore_ascii_case("prod")
}

/// Settings a production deployment must not leave at their defaults.
fn check_production_settings(
    environment: &str,
    api_config: &ApiConfig,
    auth_config: &AuthConfig,
) -> ApiResult<()> {
    auth_config.validate_for_production(environment)?;
    if is_production(environment) && api_config.cors_origins.is_empty() {
        return Err(ApiError::invalid_input(
            "DUET_CORS_ORIGINS must list the allowed origins in production",
        ));
    }
    Ok(())
}

/// Assemble the service.
///
/// `/cache/*`, `/health/*`, `/metrics` and `/openapi.json` are public.
/// `/refresh` and `/user/*` sit behind [`auth_middleware`]. From the outside
/// in, every request passes CORS, then gzip (the combined report is large),
/// then request metrics and tracing.
///
/// In `production`/`prod` this refuses a development JWT secret and an empty
/// CORS origin list.
pub fn create_api_router(
    state: AppState,
    api_config: &ApiConfig,
    auth_config: AuthConfig,
    environment: &str,
) -> ApiResult<Router> {
    check_production_settings(environment, api_config, &auth_config)?;

    let protected = Router::new()
        .merge(refresh::create_router())
        .nest("/user", user::create_router())
        .layer(from_fn_with_state(
            AuthMiddlewareState::new(auth_config),
            auth_middleware,
        ));

    let router = Router::new()
        .nest("/cache", report::create_router())
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .merge(protected);

    #[cfg(feature = "openapi")]
    let router = router.route("/openapi.json", get(openapi_json));

    Ok(router
        .with_state(state)
        .layer(from_fn(observability_middleware))
        .layer(CompressionLayer::new())
        .layer(cors_layer(api_config)))
}

/// An empty origin list means any origin (development).
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.restricts_origins() {
        return base.allow_origin(Any).allow_headers(Any);
    }

    tracing::debug!(origins = ?config.cors_origins, "CORS restricted");
    let policy = config.clone();
    base.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        origin
            .to_str()
            .is_ok_and(|origin| policy.is_origin_allowed(origin))
    }))
    .allow_headers([
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        HeaderName::from_static("x-api-key"),
    ])
    .allow_credentials(config.cors_allow_credentials)
}

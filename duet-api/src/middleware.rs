//! Request authentication layer for the protected routes.

use crate::auth::{authenticate, AuthConfig, AuthContext};
use crate::error::ApiError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub auth_config: Arc<AuthConfig>,
}

impl AuthMiddlewareState {
    pub fn new(auth_config: AuthConfig) -> Self {
        Self {
            auth_config: Arc::new(auth_config),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Resolve the caller and stash the [`AuthContext`] in the request
/// extensions, or answer 401 without calling the handler.
///
/// ```ignore
/// let protected = Router::new()
///     .route("/refresh", post(trigger_refresh))
///     .layer(from_fn_with_state(AuthMiddlewareState::new(auth), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let context = authenticate(
        &state.auth_config,
        header(request.headers(), "x-api-key"),
        header(request.headers(), "authorization"),
    )
    .inspect_err(|e| tracing::debug!(code = %e.code, path = %request.uri().path(), "auth rejected"))?;

    tracing::trace!(user_id = %context.user_id, "caller authenticated");
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Handler argument carrying the authenticated caller. Rejects with 401 when
/// [`auth_middleware`] did not run for the route.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthContext>() {
            Some(context) => Ok(AuthExtractor(context.clone())),
            None => Err(ApiError::unauthorized("No authenticated caller")),
        }
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    async fn whoami(caller: AuthExtractor) -> String {
        caller.user_id.clone()
    }

    fn guarded() -> Router {
        let mut config = AuthConfig::default();
        config.add_api_key("test_key_123".to_string());
        config.add_named_api_key("dora", "dora-key");
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(
                AuthMiddlewareState::new(config),
                auth_middleware,
            ))
    }

    async fn call(app: Router, api_key: Option<&str>) -> Result<(StatusCode, String), Box<dyn std::error::Error>> {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        let response = app.oneshot(builder.body(Body::empty())?).await?;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, String::from_utf8(body.to_vec())?))
    }

    #[tokio::test]
    async fn test_anonymous_request_is_rejected() -> TestResult {
        let (status, _) = call(guarded(), None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(guarded(), Some("wrong")).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn test_caller_reaches_handler() -> TestResult {
        assert_eq!(
            call(guarded(), Some("test_key_123")).await?,
            (StatusCode::OK, "api_key_test_key".to_string())
        );
        assert_eq!(
            call(guarded(), Some("dora-key")).await?,
            (StatusCode::OK, "dora".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_extractor_needs_the_layer() -> TestResult {
        let unguarded = Router::new().route("/whoami", get(whoami));
        let (status, _) = call(unguarded, Some("test_key_123")).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        Ok(())
    }
}

//! HTTP error body shared by every DUET endpoint.
//!
//! Failures leave the server as `{ "code": "UPSTREAM_TIMEOUT", "message": ... }`
//! with the status fixed by the code. Refresh failures keep their kind so a
//! client can tell a missing upstream token from an upstream outage.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use duet_core::{RefreshError, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    InvalidToken,
    TokenExpired,
    InvalidInput,
    /// Upstream token or base URL not set.
    ConfigMissing,
    UpstreamTimeout,
    UpstreamError,
    /// The new artifact could not be written; the previous one still serves.
    StorageWriteFailure,
    StorageError,
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        use ErrorCode::*;
        match self {
            Unauthorized | InvalidToken | TokenExpired => StatusCode::UNAUTHORIZED,
            InvalidInput => StatusCode::BAD_REQUEST,
            UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            UpstreamError => StatusCode::BAD_GATEWAY,
            ConfigMissing | StorageWriteFailure | StorageError | InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Wire name, as serialized.
    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            Unauthorized => "UNAUTHORIZED",
            InvalidToken => "INVALID_TOKEN",
            TokenExpired => "TOKEN_EXPIRED",
            InvalidInput => "INVALID_INPUT",
            ConfigMissing => "CONFIG_MISSING",
            UpstreamTimeout => "UPSTREAM_TIMEOUT",
            UpstreamError => "UPSTREAM_ERROR",
            StorageWriteFailure => "STORAGE_WRITE_FAILURE",
            StorageError => "STORAGE_ERROR",
            InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&RefreshError> for ErrorCode {
    fn from(err: &RefreshError) -> Self {
        match err {
            RefreshError::ConfigMissing { .. } => ErrorCode::ConfigMissing,
            RefreshError::UpstreamTimeout(_) => ErrorCode::UpstreamTimeout,
            RefreshError::Upstream(_) => ErrorCode::UpstreamError,
            RefreshError::StorageWriteFailure(_) => ErrorCode::StorageWriteFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(self, details: serde_json::Value) -> Self {
        Self {
            details: Some(details),
            ..self
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::new(ErrorCode::TokenExpired, "Token has expired")
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        ApiError::new(ErrorCode::from(&err), err.to_string())
    }
}

/// The storage reason is logged, not returned; it can carry file paths.
impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "storage operation failed");
        ApiError::new(ErrorCode::StorageError, "Storage operation failed")
    }
}

//! Caller authentication.
//!
//! `POST /refresh` and the active-selection endpoints need to know who is
//! calling. A caller presents either `X-API-Key: <key>` or
//! `Authorization: Bearer <jwt>`; either way the result is an [`AuthContext`]
//! whose `user_id` keys that caller's active selection.
//!
//! API keys are configured as `user:key` pairs. A bare key is accepted too and
//! gets a synthetic `api_key_<prefix>` identity.

use crate::error::{ApiError, ApiResult};
use duet_core::ConfigError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Placeholder used when `DUET_JWT_SECRET` is unset. Refused in production.
const DEV_SIGNING_SECRET: &str = "duet-dev-signing-secret-not-for-production";
const MIN_PRODUCTION_SECRET_LEN: usize = 32;
const API_KEY_ID_PREFIX_LEN: usize = 8;

/// Seconds since the Unix epoch. Swappable so token expiry can be tested.
pub type EpochClock = fn() -> i64;

pub fn system_epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============================================================================
// SIGNING SECRET
// ============================================================================

/// HS256 signing secret. Its `Debug` output never shows the value.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "DUET_JWT_SECRET".to_string(),
            });
        }
        Ok(Self(SecretString::from(secret)))
    }

    fn dev_placeholder() -> Self {
        Self(SecretString::from(DEV_SIGNING_SECRET.to_string()))
    }

    fn bytes(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dev_placeholder(&self) -> bool {
        self.0.expose_secret() == DEV_SIGNING_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("JwtSecret").field(&"<redacted>").finish()
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Clone)]
pub struct AuthConfig {
    /// API key -> user id.
    api_keys: HashMap<String, String>,
    pub jwt_secret: JwtSecret,
    /// Lifetime of tokens issued by [`generate_jwt_token`].
    pub jwt_expiration_secs: i64,
    /// Tolerance applied to `exp`.
    pub jwt_leeway_secs: i64,
    pub clock: EpochClock,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_keys", &self.api_keys.len())
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_leeway_secs", &self.jwt_leeway_secs)
            .finish_non_exhaustive()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: HashMap::new(),
            jwt_secret: JwtSecret::dev_placeholder(),
            jwt_expiration_secs: 3600,
            jwt_leeway_secs: 60,
            clock: system_epoch_secs,
        }
    }
}

impl AuthConfig {
    /// Read `DUET_API_KEYS` (comma-separated `user:key` or `key` entries),
    /// `DUET_JWT_SECRET`, `DUET_JWT_EXPIRATION_SECS` and
    /// `DUET_JWT_LEEWAY_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(entries) = std::env::var("DUET_API_KEYS") {
            for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                match entry.split_once(':') {
                    Some((user, key)) if !user.trim().is_empty() && !key.trim().is_empty() => {
                        config.add_named_api_key(user.trim(), key.trim())
                    }
                    _ => config.add_api_key(entry.to_string()),
                }
            }
        }

        if let Some(secret) = std::env::var("DUET_JWT_SECRET")
            .ok()
            .and_then(|s| JwtSecret::new(s).ok())
        {
            config.jwt_secret = secret;
        }
        if let Some(secs) = env_i64("DUET_JWT_EXPIRATION_SECS") {
            config.jwt_expiration_secs = secs;
        }
        if let Some(secs) = env_i64("DUET_JWT_LEEWAY_SECS") {
            config.jwt_leeway_secs = secs;
        }
        config
    }

    /// A production deployment must bring its own signing secret of at least
    /// 32 characters. Other environments only get a warning.
    pub fn validate_for_production(&self, environment: &str) -> ApiResult<()> {
        let production = matches!(
            environment.to_ascii_lowercase().as_str(),
            "production" | "prod"
        );

        let problem = if self.jwt_secret.is_dev_placeholder() {
            Some("DUET_JWT_SECRET is not set".to_string())
        } else if self.jwt_secret.len() < MIN_PRODUCTION_SECRET_LEN {
            Some(format!(
                "DUET_JWT_SECRET has {} characters, {} required",
                self.jwt_secret.len(),
                MIN_PRODUCTION_SECRET_LEN
            ))
        } else {
            None
        };

        match problem {
            Some(problem) if production => Err(ApiError::invalid_input(format!(
                "refusing to start in {environment}: {problem}"
            ))),
            Some(problem) => {
                tracing::warn!(%environment, "{problem}");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Register a bare key; the caller is identified by the key prefix.
    pub fn add_api_key(&mut self, key: String) {
        let user_id = format!(
            "api_key_{}",
            key.chars().take(API_KEY_ID_PREFIX_LEN).collect::<String>()
        );
        self.api_keys.insert(key, user_id);
    }

    pub fn add_named_api_key(&mut self, user_id: &str, key: &str) {
        self.api_keys.insert(key.to_string(), user_id.to_string());
    }

    pub fn api_key_user(&self, key: &str) -> Option<&str> {
        self.api_keys.get(key).map(String::as_str)
    }

    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.api_keys.contains_key(key)
    }
}

fn env_i64(name: &str) -> Option<i64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

// ============================================================================
// CLAIMS AND CONTEXT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn issue(user_id: String, now: i64, lifetime_secs: i64) -> Self {
        Self {
            sub: user_id,
            iat: now,
            exp: now.saturating_add(lifetime_secs),
        }
    }

    pub fn is_expired_at(&self, now: i64, leeway_secs: i64) -> bool {
        self.exp.saturating_add(leeway_secs) < now
    }
}

/// Who made the request. Inserted into request extensions by
/// [`crate::middleware::auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub auth_method: AuthMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    ApiKey,
    Jwt,
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

pub fn validate_api_key(config: &AuthConfig, api_key: &str) -> ApiResult<()> {
    authenticate_api_key(config, api_key).map(|_| ())
}

/// Verify the signature, then check `exp` against the configured clock.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims = HashSet::from(["exp".to_string(), "sub".to_string()]);

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::InvalidSignature => ApiError::invalid_token("Token signature does not match"),
            _ => ApiError::invalid_token(format!("Malformed token: {e}")),
        }
    })?;

    if claims.is_expired_at((config.clock)(), config.jwt_leeway_secs) {
        return Err(ApiError::token_expired());
    }
    Ok(claims)
}

/// Issue an HS256 token for `user_id`, valid for `jwt_expiration_secs`.
pub fn generate_jwt_token(config: &AuthConfig, user_id: String) -> ApiResult<String> {
    let claims = Claims::issue(user_id, (config.clock)(), config.jwt_expiration_secs);
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.bytes()),
    )
    .map_err(|e| ApiError::internal_error(format!("Could not sign token: {e}")))
}

pub fn authenticate_api_key(config: &AuthConfig, api_key: &str) -> ApiResult<AuthContext> {
    config
        .api_key_user(api_key)
        .map(|user_id| AuthContext {
            user_id: user_id.to_string(),
            auth_method: AuthMethod::ApiKey,
        })
        .ok_or_else(|| ApiError::unauthorized("Unknown API key"))
}

pub fn authenticate_jwt(config: &AuthConfig, token: &str) -> ApiResult<AuthContext> {
    let claims = validate_jwt_token(config, token)?;
    Ok(AuthContext {
        user_id: claims.sub,
        auth_method: AuthMethod::Jwt,
    })
}

/// Resolve the caller from the raw header values. An API key wins over a
/// bearer token when both are sent.
pub fn authenticate(
    config: &AuthConfig,
    api_key_header: Option<&str>,
    auth_header: Option<&str>,
) -> ApiResult<AuthContext> {
    match (api_key_header, auth_header) {
        (Some(key), _) => authenticate_api_key(config, key),
        (None, Some(value)) => match value.strip_prefix("Bearer ") {
            Some(token) => authenticate_jwt(config, token.trim()),
            None => Err(ApiError::invalid_token("Expected a Bearer token")),
        },
        (None, None) => Err(ApiError::unauthorized(
            "Send X-API-Key or Authorization: Bearer",
        )),
    }
}

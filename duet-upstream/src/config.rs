//! Upstream configuration.

use std::time::Duration;

use duet_core::UpstreamError;
use secrecy::{ExposeSecret, SecretString};

/// Default fetch ceiling: 30 minutes per report.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 1800;

/// Connection settings for the upstream report generator.
///
/// Base URL and token are optional here so the service can start without
/// them; a refresh against an unconfigured source fails with
/// `ConfigMissing` before any network I/O.
#[derive(Clone)]
pub struct UpstreamConfig {
    pub base_url: Option<String>,
    pub token: Option<SecretString>,
    pub timeout: Duration,
    pub default_category: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            default_category: None,
        }
    }
}

impl UpstreamConfig {
    /// Create upstream configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `DUET_UPSTREAM_BASE_URL`: Report generator base URL
    /// - `DUET_UPSTREAM_TOKEN`: Bearer token
    /// - `DUET_UPSTREAM_TIMEOUT_SECS`: Per-report ceiling (default: 1800)
    /// - `DUET_UPSTREAM_CATEGORY`: Optional default category filter
    pub fn from_env() -> Self {
        Self {
            base_url: non_empty_var("DUET_UPSTREAM_BASE_URL"),
            token: non_empty_var("DUET_UPSTREAM_TOKEN").map(|t| SecretString::new(t.into())),
            timeout: Duration::from_secs(
                std::env::var("DUET_UPSTREAM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            ),
            default_category: non_empty_var("DUET_UPSTREAM_CATEGORY"),
        }
    }

    /// Builder-style setter for tests and embedding.
    pub fn with_credentials(mut self, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self.token = Some(SecretString::new(token.into().into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_category(mut self, category: impl Into<String>) -> Self {
        self.default_category = Some(category.into());
        self
    }

    /// Base URL without trailing slash, or `ConfigMissing`.
    pub fn require_base_url(&self) -> Result<&str, UpstreamError> {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .ok_or_else(|| UpstreamError::ConfigMissing {
                field: "DUET_UPSTREAM_BASE_URL".to_string(),
            })
    }

    /// Token value, or `ConfigMissing`.
    pub fn require_token(&self) -> Result<&str, UpstreamError> {
        self.token
            .as_ref()
            .map(|token| token.expose_secret())
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| UpstreamError::ConfigMissing {
                field: "DUET_UPSTREAM_TOKEN".to_string(),
            })
    }

    pub fn is_configured(&self) -> bool {
        self.require_base_url().is_ok() && self.require_token().is_ok()
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("default_category", &self.default_category)
            .finish()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unconfigured() {
        let config = UpstreamConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.timeout, Duration::from_secs(1800));
        assert_eq!(
            config.require_token(),
            Err(UpstreamError::ConfigMissing {
                field: "DUET_UPSTREAM_TOKEN".to_string()
            })
        );
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = UpstreamConfig::default().with_credentials("https://reports.local/api/", "t");
        assert_eq!(config.require_base_url(), Ok("https://reports.local/api"));
        assert!(config.is_configured());
    }

    #[test]
    fn test_blank_token_counts_as_missing() {
        let config = UpstreamConfig::default().with_credentials("https://reports.local", "   ");
        assert!(matches!(
            config.require_token(),
            Err(UpstreamError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = UpstreamConfig::default().with_credentials("https://reports.local", "s3cr3t");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("[REDACTED]"));
    }
}

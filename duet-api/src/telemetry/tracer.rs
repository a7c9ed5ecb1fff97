//! Log subscriber setup.
//!
//! `RUST_LOG` picks the filter. `DUET_LOG_FORMAT=pretty` switches from JSON
//! lines to human-readable output for local runs.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

const DEFAULT_FILTER: &str = "duet_api=debug,duet_upstream=info,duet_storage=info,tower_http=info,info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("pretty") {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    /// `DUET_ENVIRONMENT`; `production`/`prod` tightens startup checks.
    pub environment: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let var = |name: &str, fallback: &str| {
            std::env::var(name).unwrap_or_else(|_| fallback.to_string())
        };
        Self {
            service_name: var("DUET_SERVICE_NAME", "duet-api"),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: var("DUET_ENVIRONMENT", "development"),
            log_format: LogFormat::parse(&var("DUET_LOG_FORMAT", "json")),
        }
    }
}

impl TelemetryConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
            || self.environment.eq_ignore_ascii_case("prod")
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init(),
    };
    installed.map_err(|e| ApiError::internal_error(format!("log subscriber: {e}")))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        "logging ready"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_and_format() {
        let config = TelemetryConfig {
            service_name: "duet-api".to_string(),
            service_version: "0.0.0".to_string(),
            environment: "PROD".to_string(),
            log_format: LogFormat::parse("Pretty"),
        };
        assert!(config.is_production());
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Json);
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}

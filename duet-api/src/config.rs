//! Server configuration.
//!
//! CORS settings for the HTTP layer and the service settings that wire the
//! cache store, run log, selection store and refresh schedule. Everything
//! is loaded from environment variables with development defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use duet_core::ConfigError;
use duet_storage::{DEFAULT_CACHE_FILE, DEFAULT_RUN_LOG_CAPACITY};

/// Cross-origin policy of the HTTP layer.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Exact origins or `*.domain` patterns (HTTPS subdomains only). Empty
    /// admits any origin.
    pub cors_origins: Vec<String>,
    pub cors_allow_credentials: bool,
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 24 * 60 * 60,
        }
    }
}

impl ApiConfig {
    /// `DUET_CORS_ORIGINS` (comma-separated), `DUET_CORS_ALLOW_CREDENTIALS`
    /// and `DUET_CORS_MAX_AGE_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cors_origins: std::env::var("DUET_CORS_ORIGINS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            cors_allow_credentials: std::env::var("DUET_CORS_ALLOW_CREDENTIALS")
                .map(|flag| flag.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.cors_allow_credentials),
            cors_max_age_secs: std::env::var("DUET_CORS_MAX_AGE_SECS")
                .ok()
                .and_then(|secs| secs.trim().parse().ok())
                .unwrap_or(defaults.cors_max_age_secs),
        }
    }

    pub fn restricts_origins(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if !self.restricts_origins() {
            return true;
        }
        self.cors_origins.iter().any(|allowed| match allowed.strip_prefix("*.") {
            Some(domain) => origin
                .strip_prefix("https://")
                .and_then(|host| host.strip_suffix(domain))
                .is_some_and(|sub| sub.len() > 1 && sub.ends_with('.')),
            None => allowed == origin,
        })
    }
}

// ============================================================================
// FETCH MODE
// ============================================================================

/// How the two upstream reports are fetched during a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Both reports in flight at once; the first failure cancels the other.
    #[default]
    Concurrent,
    /// Report 134, then report 151.
    Sequential,
}

impl FromStr for FetchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concurrent" | "parallel" => Ok(FetchMode::Concurrent),
            "sequential" | "serial" => Ok(FetchMode::Sequential),
            other => Err(ConfigError::InvalidValue {
                field: "DUET_FETCH_MODE".to_string(),
                value: other.to_string(),
                reason: "expected 'concurrent' or 'sequential'".to_string(),
            }),
        }
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

/// Storage and refresh wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Directory holding the combined report artifact.
    pub cache_dir: PathBuf,

    /// File name of the combined report artifact.
    pub cache_file: String,

    /// JSON file for active selections; in-memory when unset.
    pub selection_file: Option<PathBuf>,

    /// Maximum run log entries kept.
    pub run_log_capacity: usize,

    pub fetch_mode: FetchMode,

    /// Interval of the scheduled refresh job; disabled when unset.
    pub refresh_interval: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./data/cache"),
            cache_file: DEFAULT_CACHE_FILE.to_string(),
            selection_file: None,
            run_log_capacity: DEFAULT_RUN_LOG_CAPACITY,
            fetch_mode: FetchMode::default(),
            refresh_interval: None,
        }
    }
}

impl ServiceConfig {
    /// Create ServiceConfig from environment variables.
    ///
    /// - `DUET_CACHE_DIR` (default: `./data/cache`)
    /// - `DUET_CACHE_FILE` (default: `combined-report.json`)
    /// - `DUET_SELECTION_FILE` (optional)
    /// - `DUET_RUN_LOG_CAPACITY` (default: 1000)
    /// - `DUET_FETCH_MODE`: `concurrent` or `sequential` (default: concurrent)
    /// - `DUET_REFRESH_INTERVAL_SECS` (optional, must be > 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cache_dir = non_empty_var("DUET_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);
        let cache_file = non_empty_var("DUET_CACHE_FILE").unwrap_or(defaults.cache_file);
        if cache_file.contains('/') || cache_file.contains('\\') {
            return Err(ConfigError::InvalidValue {
                field: "DUET_CACHE_FILE".to_string(),
                value: cache_file,
                reason: "must be a file name, not a path".to_string(),
            });
        }

        let run_log_capacity = match non_empty_var("DUET_RUN_LOG_CAPACITY") {
            Some(value) => parse_positive("DUET_RUN_LOG_CAPACITY", &value)? as usize,
            None => defaults.run_log_capacity,
        };

        let fetch_mode = match non_empty_var("DUET_FETCH_MODE") {
            Some(value) => value.parse()?,
            None => defaults.fetch_mode,
        };

        let refresh_interval = match non_empty_var("DUET_REFRESH_INTERVAL_SECS") {
            Some(value) => Some(Duration::from_secs(parse_positive(
                "DUET_REFRESH_INTERVAL_SECS",
                &value,
            )?)),
            None => None,
        };

        Ok(Self {
            cache_dir,
            cache_file,
            selection_file: non_empty_var("DUET_SELECTION_FILE").map(PathBuf::from),
            run_log_capacity,
            fetch_mode,
            refresh_interval,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_positive(field: &str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be a positive integer".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.as_deref() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    fn clear_service_env() -> Vec<EnvVarGuard> {
        [
            "DUET_CACHE_DIR",
            "DUET_CACHE_FILE",
            "DUET_SELECTION_FILE",
            "DUET_RUN_LOG_CAPACITY",
            "DUET_FETCH_MODE",
            "DUET_REFRESH_INTERVAL_SECS",
        ]
        .into_iter()
        .map(|key| EnvVarGuard::set(key, None))
        .collect()
    }

    #[test]
    fn test_cors_origin_matching() {
        let mut config = ApiConfig::default();
        assert_eq!(config.cors_max_age_secs, 86400);
        assert!(config.is_origin_allowed("http://localhost:5173"));

        config.cors_origins = vec![
            "https://painel.example.com".to_string(),
            "*.reports.example.com".to_string(),
        ];
        assert!(config.restricts_origins());
        assert!(config.is_origin_allowed("https://painel.example.com"));
        assert!(config.is_origin_allowed("https://sp.reports.example.com"));
        assert!(!config.is_origin_allowed("https://reports.example.com"));
        assert!(!config.is_origin_allowed("https://fakereports.example.com"));
        assert!(!config.is_origin_allowed("http://sp.reports.example.com"));
    }

    #[test]
    fn test_fetch_mode_parse() {
        assert_eq!("concurrent".parse::<FetchMode>(), Ok(FetchMode::Concurrent));
        assert_eq!(" Sequential ".parse::<FetchMode>(), Ok(FetchMode::Sequential));
        assert!("sometimes".parse::<FetchMode>().is_err());
    }

    #[test]
    fn test_service_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|p| p.into_inner());
        let _guards = clear_service_env();

        let config = ServiceConfig::from_env().expect("defaults should load");
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.cache_file, "combined-report.json");
        assert_eq!(config.refresh_interval, None);
    }

    #[test]
    fn test_service_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|p| p.into_inner());
        let mut guards = clear_service_env();
        guards.push(EnvVarGuard::set("DUET_CACHE_DIR", Some("/var/lib/duet")));
        guards.push(EnvVarGuard::set("DUET_FETCH_MODE", Some("sequential")));
        guards.push(EnvVarGuard::set("DUET_RUN_LOG_CAPACITY", Some("50")));
        guards.push(EnvVarGuard::set("DUET_REFRESH_INTERVAL_SECS", Some("3600")));

        let config = ServiceConfig::from_env().expect("config should load");
        assert_eq!(config.cache_dir, PathBuf::from("/var/lib/duet"));
        assert_eq!(config.fetch_mode, FetchMode::Sequential);
        assert_eq!(config.run_log_capacity, 50);
        assert_eq!(config.refresh_interval, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_service_config_rejects_bad_values() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|p| p.into_inner());
        let mut guards = clear_service_env();
        guards.push(EnvVarGuard::set("DUET_REFRESH_INTERVAL_SECS", Some("0")));
        assert!(ServiceConfig::from_env().is_err());

        drop(guards);
        let mut guards = clear_service_env();
        guards.push(EnvVarGuard::set("DUET_CACHE_FILE", Some("../escape.json")));
        assert!(ServiceConfig::from_env().is_err());
    }
}

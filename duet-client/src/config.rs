//! Configuration loading for the DUET client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub auth: ClientCredentials,
    pub request_timeout_ms: u64,
    /// Separate ceiling for `POST /refresh`, which waits for both upstream
    /// reports.
    pub refresh_timeout_ms: u64,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientCredentials {
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub jwt: Option<SecretString>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(SecretString::from))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfig {
    /// Root of the LMDB environment and the JSON snapshot files.
    pub data_dir: PathBuf,
    pub lmdb_max_size_mb: usize,
    /// Snapshot version. A stored snapshot with another buster is discarded.
    pub buster: String,
    pub max_age_secs: u64,
    pub persist_interval_ms: u64,
    /// Optional size limit for the file tier.
    pub file_max_bytes: Option<usize>,
}

impl PersistenceConfig {
    pub fn lmdb_dir(&self) -> PathBuf {
        self.data_dir.join("lmdb")
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_millis(self.persist_interval_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or DUET_CLIENT_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        let has_api_key = self
            .auth
            .api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty());
        let has_jwt = self
            .auth
            .jwt
            .as_ref()
            .is_some_and(|t| !t.expose_secret().trim().is_empty());
        if !has_api_key && !has_jwt {
            return Err(ConfigError::InvalidValue {
                field: "auth",
                reason: "api_key or jwt must be provided".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.refresh_timeout_ms < self.request_timeout_ms {
            return Err(ConfigError::InvalidValue {
                field: "refresh_timeout_ms",
                reason: "must be >= request_timeout_ms".to_string(),
            });
        }
        if self.persistence.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "persistence.data_dir",
                reason: "must not be empty".to_string(),
            });
        }
        if self.persistence.lmdb_max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "persistence.lmdb_max_size_mb",
                reason: "must be > 0".to_string(),
            });
        }
        if self.persistence.buster.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "persistence.buster",
                reason: "must not be empty".to_string(),
            });
        }
        if self.persistence.max_age_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "persistence.max_age_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.persistence.persist_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "persistence.persist_interval_ms",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("DUET_CLIENT_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

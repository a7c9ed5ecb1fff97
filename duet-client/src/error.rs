use crate::api_client::ApiClientError;
use crate::config::ConfigError;

/// Failure of a [`crate::ClientSession`] call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("client configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiClientError),
    /// A response could not be stored in the query cache.
    #[error("query cache: {0}")]
    Cache(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status behind the failure, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api(e) => e.status(),
            ClientError::Config(_) | ClientError::Cache(_) => None,
        }
    }
}

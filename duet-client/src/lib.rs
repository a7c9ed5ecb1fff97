//! DUET client library exports.

pub mod api_client;
pub mod config;
pub mod error;
pub mod persistence;
pub mod query_cache;
pub mod session;

pub use api_client::{ApiClientError, RestClient};
pub use config::{ClientConfig, ClientCredentials, PersistenceConfig};
pub use error::ClientError;
pub use persistence::{select_snapshot_store, QueryPersister, SNAPSHOT_KEY};
pub use query_cache::{PersistedQuerySnapshot, QueryCache, QueryEntry};
pub use session::ClientSession;

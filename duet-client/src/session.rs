//! Client session: REST client, query cache and warm-start persistence.

use std::sync::Arc;

use duet_api::types::{CombinedReportResponse, LogResponse, RefreshResponse};
use duet_storage::SnapshotTier;

use crate::api_client::RestClient;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::persistence::QueryPersister;
use crate::query_cache::{
    QueryCache, ACTIVE_SELECTION_QUERY, COMBINED_REPORT_QUERY, RUN_LOG_QUERY,
};

#[derive(Debug, Clone)]
pub struct ClientSession {
    rest: RestClient,
    cache: Arc<QueryCache>,
    persister: QueryPersister,
}

impl ClientSession {
    /// Build the session and restore the previous snapshot, if any.
    pub fn start(config: &ClientConfig) -> Result<Self, ClientError> {
        let rest = RestClient::new(config)?;
        let persister = QueryPersister::from_config(&config.persistence);
        Ok(Self::with_parts(rest, persister))
    }

    pub fn with_parts(rest: RestClient, persister: QueryPersister) -> Self {
        let cache = Arc::new(QueryCache::new());
        let warm = persister.restore_into(&cache);
        tracing::debug!(warm, tier = %persister.active_tier(), "Client session started");
        Self {
            rest,
            cache,
            persister,
        }
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn cache(&self) -> Arc<QueryCache> {
        Arc::clone(&self.cache)
    }

    pub fn persister(&self) -> &QueryPersister {
        &self.persister
    }

    pub fn snapshot_tier(&self) -> SnapshotTier {
        self.persister.active_tier()
    }

    /// Report from the warm cache, without touching the network.
    pub fn cached_report(&self) -> Option<CombinedReportResponse> {
        self.cache.get(COMBINED_REPORT_QUERY)
    }

    /// Fetch the latest report. `ok: false` bodies are returned but never
    /// replace the cached copy.
    pub async fn fetch_report(&self) -> Result<CombinedReportResponse, ClientError> {
        let report = self.rest.combined_report().await?;
        if report.ok {
            self.cache.set(COMBINED_REPORT_QUERY, &report)?;
            self.persist_in_background();
        } else {
            tracing::warn!(
                reason = report.reason.as_deref().unwrap_or("unknown"),
                "Server could not read the report cache"
            );
        }
        Ok(report)
    }

    /// Trigger a refresh. A successful one marks the report and log stale.
    pub async fn refresh(&self) -> Result<RefreshResponse, ClientError> {
        let response = self.rest.refresh().await?;
        if response.success {
            self.cache.invalidate(COMBINED_REPORT_QUERY);
            self.cache.invalidate(RUN_LOG_QUERY);
            self.persist_in_background();
        }
        Ok(response)
    }

    pub async fn run_log(&self) -> Result<LogResponse, ClientError> {
        let log = self.rest.run_log().await?;
        self.cache.set(RUN_LOG_QUERY, &log)?;
        self.persist_in_background();
        Ok(log)
    }

    pub async fn active_selection(&self) -> Result<Option<String>, ClientError> {
        let selection = self.rest.active_selection().await?;
        self.cache.set(ACTIVE_SELECTION_QUERY, &selection)?;
        self.persist_in_background();
        Ok(selection)
    }

    pub async fn set_active_selection(&self, id: Option<&str>) -> Result<Option<String>, ClientError> {
        let selection = self.rest.set_active_selection(id).await?;
        self.cache.set(ACTIVE_SELECTION_QUERY, &selection)?;
        self.persist_in_background();
        Ok(selection)
    }

    /// Forget every cached query and the stored snapshot.
    pub fn reset(&self) {
        self.cache.clear();
        self.persister.remove();
    }

    /// Final blocking write before exit.
    pub fn flush(&self) {
        self.persister.persist_now(&self.cache);
    }

    fn persist_in_background(&self) {
        // Not awaited. Writes are serialized inside the persister.
        drop(self.persister.spawn_persist(self.cache()));
    }
}

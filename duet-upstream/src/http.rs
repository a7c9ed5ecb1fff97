//! HTTP report client.
//!
//! `GET {base_url}/reports/{id}` with a bearer token. The configured ceiling
//! is applied twice: as the reqwest client timeout and as an outer
//! `tokio::time::timeout` around the whole request, body included.

use std::time::Instant;

use async_trait::async_trait;
use duet_core::{ConfigError, ReportRow, SourceReport, UpstreamError};
use reqwest::{header, Client};
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::rows::extract_rows;
use crate::ReportSource;

/// Upper bound on how much of an error body is kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Production report source backed by the upstream HTTP API.
#[derive(Clone)]
pub struct HttpReportClient {
    client: Client,
    config: UpstreamConfig,
}

impl HttpReportClient {
    /// Create a new client.
    ///
    /// Missing credentials are not an error here; they surface as
    /// `ConfigMissing` when a fetch is attempted.
    pub fn new(config: UpstreamConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "upstream_http_client".to_string(),
                value: format!("{:?}", config.timeout),
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn report_url(&self, base_url: &str, report: SourceReport) -> String {
        format!("{}/reports/{}", base_url, report.report_id())
    }

    async fn fetch_once(
        &self,
        report: SourceReport,
        base_url: &str,
        token: &str,
    ) -> Result<Vec<ReportRow>, UpstreamError> {
        let url = self.report_url(base_url, report);
        let mut request = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::ACCEPT, "application/json");
        if let Some(category) = &self.config.default_category {
            request = request.query(&[("category", category.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(report, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UpstreamError::RequestFailed {
                report,
                status: status.as_u16(),
                message: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.timeout_error(report)
            } else {
                UpstreamError::InvalidResponse {
                    report,
                    reason: format!("Failed to parse response: {}", e),
                }
            }
        })?;

        extract_rows(report, body)
    }

    fn map_transport_error(&self, report: SourceReport, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            self.timeout_error(report)
        } else {
            UpstreamError::Transport {
                report,
                reason: err.to_string(),
            }
        }
    }

    fn timeout_error(&self, report: SourceReport) -> UpstreamError {
        UpstreamError::Timeout {
            report,
            timeout_secs: self.config.timeout.as_secs(),
        }
    }
}

#[async_trait]
impl ReportSource for HttpReportClient {
    fn ensure_configured(&self) -> Result<(), UpstreamError> {
        self.config.require_base_url()?;
        self.config.require_token()?;
        Ok(())
    }

    async fn fetch_report(&self, report: SourceReport) -> Result<Vec<ReportRow>, UpstreamError> {
        let base_url = self.config.require_base_url()?;
        let token = self.config.require_token()?;

        let start = Instant::now();
        tracing::debug!(report = %report, "Fetching upstream report");

        let result = tokio::time::timeout(self.config.timeout, self.fetch_once(report, base_url, token))
            .await
            .unwrap_or_else(|_| Err(self.timeout_error(report)));

        match &result {
            Ok(rows) => tracing::info!(
                report = %report,
                rows = rows.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Upstream report fetched"
            ),
            Err(e) => tracing::warn!(
                report = %report,
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "Upstream report fetch failed"
            ),
        }

        result
    }
}

impl std::fmt::Debug for HttpReportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReportClient")
            .field("config", &self.config)
            .finish()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_client_fails_fast() {
        let client =
            HttpReportClient::new(UpstreamConfig::default()).expect("client should build");
        assert!(matches!(
            client.ensure_configured(),
            Err(UpstreamError::ConfigMissing { .. })
        ));

        let err = client
            .fetch_report134()
            .await
            .expect_err("fetch without config should fail");
        assert!(matches!(err, UpstreamError::ConfigMissing { .. }));
    }

    #[test]
    fn test_report_url() {
        let client = HttpReportClient::new(
            UpstreamConfig::default().with_credentials("http://upstream.local/", "token"),
        )
        .expect("client should build");
        let base = client.config().require_base_url().expect("base url set");
        assert_eq!(
            client.report_url(base, SourceReport::Report151),
            "http://upstream.local/reports/151"
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let client = HttpReportClient::new(
            UpstreamConfig::default().with_credentials("http://upstream.local", "hunter2"),
        )
        .expect("client should build");
        assert!(!format!("{:?}", client).contains("hunter2"));
    }
}

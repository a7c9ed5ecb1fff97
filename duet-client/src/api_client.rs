//! REST client for the DUET API.

use std::time::Duration;

use duet_api::error::ApiError as ApiServerError;
use duet_api::types::{ActiveSelectionBody, CombinedReportResponse, LogResponse, RefreshResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use secrecy::ExposeSecret;

use crate::config::{ClientConfig, ClientCredentials};

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Server error {status}: {code}: {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl ApiClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiClientError::Server { status, .. } => Some(*status),
            ApiClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
    refresh_timeout: Duration,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_header: build_auth_headers(&config.auth)?,
            refresh_timeout: Duration::from_millis(config.refresh_timeout_ms),
        })
    }

    /// Latest cached report. A failed cache read comes back as an `ok: false`
    /// body rather than an error.
    pub async fn combined_report(&self) -> Result<CombinedReportResponse, ApiClientError> {
        let response = self
            .client
            .get(self.url("/cache/combined-report"))
            .query(&[("latest", "1"), ("read_only", "1")])
            .send()
            .await?;

        if response.status() == StatusCode::INTERNAL_SERVER_ERROR {
            let text = response.text().await?;
            return serde_json::from_str::<CombinedReportResponse>(&text).map_err(|_| {
                ApiClientError::InvalidResponse(format!("HTTP 500: {}", text))
            });
        }
        self.parse_response(response).await
    }

    pub async fn run_log(&self) -> Result<LogResponse, ApiClientError> {
        let response = self
            .client
            .get(self.url("/cache/combined-report/log"))
            .send()
            .await?;
        self.parse_response(response).await
    }

    /// Trigger a refresh and wait for its outcome.
    ///
    /// Refresh failures (upstream, config, cache write) are returned as a
    /// `success: false` body. Only transport and auth problems are errors.
    pub async fn refresh(&self) -> Result<RefreshResponse, ApiClientError> {
        let response = self
            .client
            .post(self.url("/refresh"))
            .headers(self.auth_header.clone())
            .timeout(self.refresh_timeout)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if let Ok(body) = serde_json::from_str::<RefreshResponse>(&text) {
            return Ok(body);
        }
        Err(server_error(status, &text))
    }

    pub async fn active_selection(&self) -> Result<Option<String>, ApiClientError> {
        let response = self
            .client
            .get(self.url("/user/active-acompanhamento"))
            .headers(self.auth_header.clone())
            .send()
            .await?;
        let body: ActiveSelectionBody = self.parse_response(response).await?;
        Ok(body.active_acompanhamento_id)
    }

    /// Replace the caller's selection. `None` clears it.
    pub async fn set_active_selection(
        &self,
        id: Option<&str>,
    ) -> Result<Option<String>, ApiClientError> {
        let body = ActiveSelectionBody {
            active_acompanhamento_id: id.map(str::to_string),
        };
        let response = self
            .client
            .put(self.url("/user/active-acompanhamento"))
            .headers(self.auth_header.clone())
            .json(&body)
            .send()
            .await?;
        let body: ActiveSelectionBody = self.parse_response(response).await?;
        Ok(body.active_acompanhamento_id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let text = response.text().await?;
            Err(server_error(status, &text))
        }
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("refresh_timeout", &self.refresh_timeout)
            .finish()
    }
}

fn server_error(status: StatusCode, text: &str) -> ApiClientError {
    match serde_json::from_str::<ApiServerError>(text) {
        Ok(api_error) => ApiClientError::Server {
            status: status.as_u16(),
            code: api_error.code.to_string(),
            message: api_error.message,
        },
        Err(_) => ApiClientError::InvalidResponse(format!("HTTP {}: {}", status.as_u16(), text)),
    }
}

fn build_auth_headers(auth: &ClientCredentials) -> Result<HeaderMap, ApiClientError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = &auth.api_key {
        let mut value = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|e| ApiClientError::Config(e.to_string()))?;
        value.set_sensitive(true);
        headers.insert(HeaderName::from_static("x-api-key"), value);
    }
    if let Some(jwt) = &auth.jwt {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", jwt.expose_secret()))
            .map_err(|e| ApiClientError::Config(e.to_string()))?;
        value.set_sensitive(true);
        headers.insert(HeaderName::from_static("authorization"), value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_auth_headers_are_sensitive() -> Result<(), ApiClientError> {
        let headers = build_auth_headers(&ClientCredentials {
            api_key: Some(SecretString::from("client_key_0001".to_string())),
            jwt: Some(SecretString::from("header.payload.sig".to_string())),
        })?;
        let api_key = headers.get("x-api-key").ok_or(ApiClientError::Config("missing".into()))?;
        assert!(api_key.is_sensitive());
        assert_eq!(
            headers.get("authorization").map(|v| v.as_bytes()),
            Some(&b"Bearer header.payload.sig"[..])
        );
        Ok(())
    }

    #[test]
    fn test_server_error_decodes_api_error() {
        let text = r#"{"code":"UNAUTHORIZED","message":"Invalid API key"}"#;
        match server_error(StatusCode::UNAUTHORIZED, text) {
            ApiClientError::Server { status, message, .. } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("expected server error, got {:?}", other),
        }
        assert!(matches!(
            server_error(StatusCode::BAD_GATEWAY, "<html>"),
            ApiClientError::InvalidResponse(_)
        ));
    }
}

//! Prometheus collectors for the report cache and the `/metrics` scrape
//! endpoint. Collectors live in the default registry.

use axum::{http::header::CONTENT_TYPE, http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Upstream reports routinely run for tens of minutes.
const LONG_RUN_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1200.0, 1800.0, 2700.0, 3600.0,
];

/// Registered on first use. Recording is skipped if registration failed.
pub static METRICS: Lazy<ApiResult<DuetMetrics>> = Lazy::new(DuetMetrics::new);

fn registration_failed(name: &str) -> impl FnOnce(prometheus::Error) -> ApiError + '_ {
    move |e| ApiError::internal_error(format!("cannot register {name}: {e}"))
}

#[derive(Clone)]
pub struct DuetMetrics {
    /// method, path, status
    pub http_requests_total: CounterVec,
    /// method, path
    pub http_request_duration_seconds: HistogramVec,
    /// outcome: `success`, `already_running` or the failure kind
    pub refresh_runs_total: CounterVec,
    /// outcome
    pub refresh_duration_seconds: HistogramVec,
    /// report, status
    pub upstream_fetch_duration_seconds: HistogramVec,
    /// result: `hit`, `empty`, `error`
    pub cache_reads_total: CounterVec,
}

impl DuetMetrics {
    pub fn new() -> ApiResult<Self> {
        let http_requests_total = register_counter_vec!(
            "duet_http_requests_total",
            "HTTP requests served",
            &["method", "path", "status"]
        )
        .map_err(registration_failed("duet_http_requests_total"))?;

        let http_request_duration_seconds = register_histogram_vec!(
            "duet_http_request_duration_seconds",
            "HTTP request latency",
            &["method", "path"],
            HTTP_LATENCY_BUCKETS.to_vec()
        )
        .map_err(registration_failed("duet_http_request_duration_seconds"))?;

        let refresh_runs_total = register_counter_vec!(
            "duet_refresh_runs_total",
            "Refresh triggers by outcome",
            &["outcome"]
        )
        .map_err(registration_failed("duet_refresh_runs_total"))?;

        let refresh_duration_seconds = register_histogram_vec!(
            "duet_refresh_duration_seconds",
            "Wall time of refresh runs",
            &["outcome"],
            LONG_RUN_BUCKETS.to_vec()
        )
        .map_err(registration_failed("duet_refresh_duration_seconds"))?;

        let upstream_fetch_duration_seconds = register_histogram_vec!(
            "duet_upstream_fetch_duration_seconds",
            "Wall time of a single upstream report fetch",
            &["report", "status"],
            LONG_RUN_BUCKETS.to_vec()
        )
        .map_err(registration_failed("duet_upstream_fetch_duration_seconds"))?;

        let cache_reads_total = register_counter_vec!(
            "duet_cache_reads_total",
            "Combined report cache reads by result",
            &["result"]
        )
        .map_err(registration_failed("duet_cache_reads_total"))?;

        Ok(Self {
            http_requests_total,
            http_request_duration_seconds,
            refresh_runs_total,
            refresh_duration_seconds,
            upstream_fetch_duration_seconds,
            cache_reads_total,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        self.http_requests_total
            .with_label_values(&[method, path, status.to_string().as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_refresh(&self, outcome: &str, duration_secs: f64) {
        self.refresh_runs_total.with_label_values(&[outcome]).inc();
        self.refresh_duration_seconds
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    pub fn record_upstream_fetch(&self, report: &str, success: bool, duration_secs: f64) {
        let status = if success { "ok" } else { "failed" };
        self.upstream_fetch_duration_seconds
            .with_label_values(&[report, status])
            .observe(duration_secs);
    }

    pub fn record_cache_read(&self, result: &str) {
        self.cache_reads_total.with_label_values(&[result]).inc();
    }
}

/// GET /metrics
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus text exposition", content_type = "text/plain"),
        (status = 500, description = "Encoding failed"),
    ),
))]
pub async fn metrics_handler() -> impl IntoResponse {
    // Force registration so a scrape before any traffic still lists the families.
    if let Err(e) = METRICS.as_ref() {
        tracing::warn!(error = %e, "metrics registry unavailable");
    }

    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    match encoder.encode(&prometheus::gather(), &mut body) {
        Ok(()) => (
            StatusCode::OK,
            [(CONTENT_TYPE, encoder.format_type().to_string())],
            body,
        ),
        Err(e) => {
            tracing::error!(error = %e, "metrics encoding failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONTENT_TYPE, "text/plain".to_string())],
                e.to_string().into_bytes(),
            )
        }
    }
}

//! OpenAPI Specification for DUET API
//!
//! Generated with utoipa from the route annotations and wire types.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::{CacheProbe, Readiness, ReadinessReport, RefreshProbe};
use crate::routes::{health, refresh, report, user};
use crate::telemetry::metrics;
use crate::types::{ActiveSelectionBody, CombinedReportResponse, LogResponse, RefreshResponse};

use duet_core::{
    FileDescriptor, ReportMeta, ReportRecord, SourceCounts, SourceDurations, SourceReport,
};

/// OpenAPI document for DUET API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "DUET API",
        version = "0.4.0",
        description = "Combined report cache: cached reads, single-flight refresh and per-user selection",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Reports", description = "Cached combined report, run log and refresh trigger"),
        (name = "Users", description = "Per-user active selection"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        // === Report Routes ===
        report::get_combined_report,
        report::get_run_log,
        refresh::trigger_refresh,

        // === User Routes ===
        user::get_active_selection,
        user::put_active_selection,

        // === Health Routes ===
        health::ping,
        health::liveness,
        health::readiness,

        // === Observability ===
        metrics::metrics_handler,
    ),
    components(
        schemas(
            // === Error Types ===
            ApiError, ErrorCode,

            // === Report Types ===
            CombinedReportResponse, RefreshResponse, LogResponse,
            FileDescriptor, ReportMeta, ReportRecord, SourceCounts, SourceDurations, SourceReport,

            // === User Types ===
            ActiveSelectionBody,

            // === Health Types ===
            ReadinessReport, Readiness, CacheProbe, RefreshProbe
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security scheme modifier for OpenAPI document.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );

            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("JWT Bearer token"))
                        .build(),
                ),
            );
        }
    }
}

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}

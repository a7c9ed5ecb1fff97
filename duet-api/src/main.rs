//! DUET API Server Binary

use std::net::SocketAddr;
use std::sync::Arc;

use duet_api::jobs::{scheduled_refresh_task, RefreshScheduleConfig};
use duet_api::telemetry::{init_tracer, TelemetryConfig};
use duet_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, ServiceConfig,
};
use duet_upstream::{HttpReportClient, UpstreamConfig};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let service_config = ServiceConfig::from_env()
        .map_err(|e| ApiError::invalid_input(format!("Invalid service configuration: {}", e)))?;
    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();

    let upstream_config = UpstreamConfig::from_env();
    if !upstream_config.is_configured() {
        tracing::warn!("Upstream base URL or token not set; refreshes will fail with CONFIG_MISSING");
    }
    let source = HttpReportClient::new(upstream_config)
        .map_err(|e| ApiError::internal_error(format!("Failed to build upstream client: {}", e)))?;

    let state = AppState::from_config(&service_config, Arc::new(source));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let schedule = service_config.refresh_interval.map(|interval| {
        tokio::spawn(scheduled_refresh_task(
            state.coordinator.clone(),
            RefreshScheduleConfig::new(interval),
            shutdown_rx,
        ))
    });

    let app = create_api_router(
        state,
        &api_config,
        auth_config,
        &telemetry_config.environment,
    )?;

    let addr = resolve_bind_addr()?;
    tracing::info!(
        %addr,
        cache_dir = %service_config.cache_dir.display(),
        fetch_mode = ?service_config.fetch_mode,
        "DUET API listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = schedule {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Scheduled refresh task ended abnormally");
        }
    }

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("DUET_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("DUET_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str.parse::<u16>().map_err(|_| {
        ApiError::invalid_input(format!("Invalid port value: {}", port_str))
    })?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
    })
}

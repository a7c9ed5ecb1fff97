//! End-to-end client tests against a live DUET API on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use duet_api::{create_api_router, ApiConfig, AppState, AuthConfig, RefreshCoordinator};
use duet_client::{
    ClientConfig, ClientCredentials, ClientError, ClientSession, PersistenceConfig, RestClient,
};
use duet_storage::{InMemoryArtifactStore, InMemorySelectionStore, SnapshotTier};
use duet_test_utils::FakeReportSource;
use secrecy::SecretString;
use tempfile::TempDir;

const API_KEY: &str = "client_key_0001";

async fn spawn_api(source: FakeReportSource) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let coordinator =
        RefreshCoordinator::new(Arc::new(source), Arc::new(InMemoryArtifactStore::new()));
    let state = AppState::new(coordinator, Arc::new(InMemorySelectionStore::new()));
    let mut auth = AuthConfig::default();
    auth.add_api_key(API_KEY.to_string());
    let router = create_api_router(state, &ApiConfig::default(), auth, "development")?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}

fn client_config(addr: SocketAddr, data_dir: &TempDir, api_key: &str) -> ClientConfig {
    ClientConfig {
        api_base_url: format!("http://{}", addr),
        auth: ClientCredentials {
            api_key: Some(SecretString::from(api_key.to_string())),
            jwt: None,
        },
        request_timeout_ms: 10_000,
        refresh_timeout_ms: 60_000,
        persistence: PersistenceConfig {
            data_dir: data_dir.path().to_path_buf(),
            lmdb_max_size_mb: 32,
            buster: "test-v1".to_string(),
            max_age_secs: 24 * 60 * 60,
            persist_interval_ms: 50,
            file_max_bytes: None,
        },
    }
}

#[tokio::test]
async fn report_is_warm_in_the_next_session() -> Result<(), Box<dyn std::error::Error>> {
    let addr = spawn_api(FakeReportSource::with_rows(1200, 340)).await?;
    let data_dir = TempDir::new()?;
    let config = client_config(addr, &data_dir, API_KEY);

    {
        let session = ClientSession::start(&config)?;
        assert_eq!(session.snapshot_tier(), SnapshotTier::Primary);
        assert!(session.cached_report().is_none());

        let empty = session.fetch_report().await?;
        assert!(empty.ok);
        assert_eq!(empty.has_file, Some(false));

        let refreshed = session.refresh().await?;
        assert!(refreshed.success, "refresh failed: {}", refreshed.message);

        let report = session.fetch_report().await?;
        assert_eq!(report.total_records, Some(1540));
        session.flush();
    }
    // Background writes from the first session must land before the reset.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    // A new session restores the report before any request.
    let session = ClientSession::start(&config)?;
    let warm = session.cached_report().ok_or("report should be restored")?;
    assert_eq!(warm.has_file, Some(true));
    assert_eq!(warm.total_records, Some(1540));
    let sources = warm.sources.ok_or("sources should be restored")?;
    assert_eq!(sources.report134_count, 1200);
    assert_eq!(sources.report151_count, 340);

    session.reset();
    assert!(ClientSession::start(&config)?.cached_report().is_none());
    Ok(())
}

#[tokio::test]
async fn selection_round_trips_through_the_api() -> Result<(), Box<dyn std::error::Error>> {
    let addr = spawn_api(FakeReportSource::with_rows(1, 1)).await?;
    let data_dir = TempDir::new()?;
    let session = ClientSession::start(&client_config(addr, &data_dir, API_KEY))?;

    assert_eq!(session.active_selection().await?, None);
    assert_eq!(
        session.set_active_selection(Some("ACC-00042")).await?,
        Some("ACC-00042".to_string())
    );
    assert_eq!(
        session.active_selection().await?,
        Some("ACC-00042".to_string())
    );
    assert_eq!(session.set_active_selection(None).await?, None);
    Ok(())
}

#[tokio::test]
async fn rejected_credentials_surface_as_server_error() -> Result<(), Box<dyn std::error::Error>> {
    let addr = spawn_api(FakeReportSource::with_rows(1, 1)).await?;
    let data_dir = TempDir::new()?;
    let rest = RestClient::new(&client_config(addr, &data_dir, "unknown_key_9999"))?;

    let err = rest.refresh().await.err().ok_or("refresh should be rejected")?;
    assert_eq!(err.status(), Some(401));

    // The read path needs no credentials.
    let report = rest.combined_report().await?;
    assert!(report.ok);
    Ok(())
}

#[tokio::test]
async fn failed_refresh_is_a_body_not_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let source = FakeReportSource::with_rows(1, 1).unconfigured("DUET_UPSTREAM_BASE_URL");
    let addr = spawn_api(source).await?;
    let data_dir = TempDir::new()?;
    let session = ClientSession::start(&client_config(addr, &data_dir, API_KEY))?;

    let response = session.refresh().await?;
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("CONFIG_MISSING"));

    let result: Result<_, ClientError> = session.fetch_report().await;
    assert_eq!(result?.has_file, Some(false));
    Ok(())
}

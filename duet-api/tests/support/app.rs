use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use duet_api::{create_api_router, ApiConfig, AppState, AuthConfig, RefreshCoordinator};
use duet_storage::{ArtifactStore, InMemoryArtifactStore, InMemorySelectionStore, SelectionStore};
use duet_test_utils::FakeReportSource;
use serde_json::Value;
use tower::ServiceExt;

pub type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub const ALICE_KEY: &str = "alice_key_0001";
#[allow(dead_code)]
pub const BOBBY_KEY: &str = "bobby_key_0002";

/// Router over a fake upstream, with two API keys registered.
pub struct TestApp {
    pub router: Router,
    #[allow(dead_code)]
    pub source: FakeReportSource,
    #[allow(dead_code)]
    pub store: Arc<dyn ArtifactStore>,
}

impl TestApp {
    pub fn new(source: FakeReportSource) -> Self {
        Self::with_store(source, Arc::new(InMemoryArtifactStore::new()))
    }

    pub fn with_store(source: FakeReportSource, store: Arc<dyn ArtifactStore>) -> Self {
        let coordinator = RefreshCoordinator::new(Arc::new(source.clone()), Arc::clone(&store));
        let selections: Arc<dyn SelectionStore> = Arc::new(InMemorySelectionStore::new());
        let state = AppState::new(coordinator, selections);

        let mut auth = AuthConfig::default();
        auth.add_api_key(ALICE_KEY.to_string());
        auth.add_api_key(BOBBY_KEY.to_string());

        let router = create_api_router(state, &ApiConfig::default(), auth, "development")
            .unwrap_or_else(|e| panic!("router should build in development: {}", e));

        Self {
            router,
            source,
            store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>, std::convert::Infallible> {
        self.router.clone().oneshot(request).await
    }

    #[allow(dead_code)]
    pub async fn get(&self, uri: &str) -> Result<(u16, Value), Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .send(Request::builder().uri(uri).body(Body::empty())?)
            .await?;
        read_json(response).await
    }

    #[allow(dead_code)]
    pub async fn refresh(&self, api_key: &str) -> Result<(u16, Value), Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/refresh")
                    .header("x-api-key", api_key)
                    .body(Body::empty())?,
            )
            .await?;
        read_json(response).await
    }
}

pub async fn read_json(
    response: Response<Body>,
) -> Result<(u16, Value), Box<dyn std::error::Error + Send + Sync>> {
    let status = response.status().as_u16();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

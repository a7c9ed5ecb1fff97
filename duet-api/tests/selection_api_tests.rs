//! Tests for the per-user active selection endpoints

use axum::body::Body;
use axum::http::{header, Request};
use duet_api::{generate_jwt_token, AuthConfig};
use duet_test_utils::FakeReportSource;
use serde_json::{json, Value};

#[path = "support/app.rs"]
mod app_support;
use app_support::{read_json, TestApp, TestResult, ALICE_KEY, BOBBY_KEY};

async fn get_selection(app: &TestApp, api_key: &str) -> Result<(u16, Value), Box<dyn std::error::Error + Send + Sync>> {
    let response = app
        .send(
            Request::builder()
                .uri("/user/active-acompanhamento")
                .header("x-api-key", api_key)
                .body(Body::empty())?,
        )
        .await?;
    read_json(response).await
}

async fn put_selection(
    app: &TestApp,
    api_key: &str,
    body: Value,
) -> Result<(u16, Value), Box<dyn std::error::Error + Send + Sync>> {
    let response = app
        .send(
            Request::builder()
                .method("PUT")
                .uri("/user/active-acompanhamento")
                .header("x-api-key", api_key)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
        )
        .await?;
    read_json(response).await
}

#[tokio::test]
async fn selection_starts_unset() -> TestResult {
    let app = TestApp::new(FakeReportSource::with_rows(1, 1));

    let (status, body) = get_selection(&app, ALICE_KEY).await?;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "activeAcompanhamentoId": null }));
    Ok(())
}

#[tokio::test]
async fn selection_is_scoped_per_user() -> TestResult {
    let app = TestApp::new(FakeReportSource::with_rows(1, 1));

    let (status, body) = put_selection(
        &app,
        ALICE_KEY,
        json!({ "activeAcompanhamentoId": "ACC-00042" }),
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(body["activeAcompanhamentoId"], json!("ACC-00042"));

    let (_, alice) = get_selection(&app, ALICE_KEY).await?;
    assert_eq!(alice["activeAcompanhamentoId"], json!("ACC-00042"));

    let (_, bobby) = get_selection(&app, BOBBY_KEY).await?;
    assert_eq!(bobby["activeAcompanhamentoId"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn last_write_wins_and_null_clears() -> TestResult {
    let app = TestApp::new(FakeReportSource::with_rows(1, 1));

    put_selection(&app, ALICE_KEY, json!({ "activeAcompanhamentoId": "ACC-1" })).await?;
    put_selection(&app, ALICE_KEY, json!({ "activeAcompanhamentoId": " ACC-2 " })).await?;
    let (_, body) = get_selection(&app, ALICE_KEY).await?;
    assert_eq!(body["activeAcompanhamentoId"], json!("ACC-2"));

    let (status, _) = put_selection(&app, ALICE_KEY, json!({ "activeAcompanhamentoId": null })).await?;
    assert_eq!(status, 200);
    let (_, body) = get_selection(&app, ALICE_KEY).await?;
    assert_eq!(body["activeAcompanhamentoId"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn blank_selection_is_rejected() -> TestResult {
    let app = TestApp::new(FakeReportSource::with_rows(1, 1));
    put_selection(&app, ALICE_KEY, json!({ "activeAcompanhamentoId": "ACC-1" })).await?;

    let (status, _) = put_selection(&app, ALICE_KEY, json!({ "activeAcompanhamentoId": "   " })).await?;
    assert_eq!(status, 400);

    let (_, body) = get_selection(&app, ALICE_KEY).await?;
    assert_eq!(body["activeAcompanhamentoId"], json!("ACC-1"));
    Ok(())
}

#[tokio::test]
async fn selection_requires_authentication() -> TestResult {
    let app = TestApp::new(FakeReportSource::with_rows(1, 1));

    let response = app
        .send(
            Request::builder()
                .uri("/user/active-acompanhamento")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status().as_u16(), 401);
    Ok(())
}

#[tokio::test]
async fn jwt_subject_keys_the_selection() -> TestResult {
    let app = TestApp::new(FakeReportSource::with_rows(1, 1));
    let token = generate_jwt_token(&AuthConfig::default(), "user-7".to_string())?;

    let response = app
        .send(
            Request::builder()
                .method("PUT")
                .uri("/user/active-acompanhamento")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"activeAcompanhamentoId":"ACC-77"}"#))?,
        )
        .await?;
    let (status, _) = read_json(response).await?;
    assert_eq!(status, 200);

    // The API-key user is someone else.
    let (_, body) = get_selection(&app, ALICE_KEY).await?;
    assert_eq!(body["activeAcompanhamentoId"], Value::Null);
    Ok(())
}

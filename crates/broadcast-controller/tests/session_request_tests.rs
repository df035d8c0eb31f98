//! Session endpoint request validation tests.
//!
//! Covers the body-shape rejections of go-live, pause, and complete, all of
//! which resolve before any token lookup.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

async fn post_session(
    path: &str,
    body: String,
) -> Result<(StatusCode, serde_json::Value), anyhow::Error> {
    let app = common::test_router();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))?,
        )
        .await?;

    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes)?;
    Ok((status, json))
}

#[tokio::test]
async fn test_go_live_malformed_body_returns_400() -> Result<(), anyhow::Error> {
    let (status, body) = post_session("/v1/sessions/go-live", "{{".to_string()).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    Ok(())
}

#[tokio::test]
async fn test_go_live_blank_token_returns_400() -> Result<(), anyhow::Error> {
    let (status, _) = post_session(
        "/v1/sessions/go-live",
        json!({"broadcast_token": "   "}).to_string(),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_go_live_invalid_handle_returns_400() -> Result<(), anyhow::Error> {
    let (status, body) = post_session(
        "/v1/sessions/go-live",
        json!({"broadcast_token": "tok", "handle": "dj nova!"}).to_string(),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    Ok(())
}

#[tokio::test]
async fn test_go_live_unknown_field_returns_400() -> Result<(), anyhow::Error> {
    let (status, _) = post_session(
        "/v1/sessions/go-live",
        json!({"broadcast_token": "tok", "slot_id": "abc"}).to_string(),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_pause_malformed_body_returns_400() -> Result<(), anyhow::Error> {
    let (status, body) = post_session("/v1/sessions/pause", "[]".to_string()).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    Ok(())
}

#[tokio::test]
async fn test_complete_missing_token_field_returns_400() -> Result<(), anyhow::Error> {
    let (status, _) = post_session("/v1/sessions/complete", json!({}).to_string()).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

//! Booking request validation tests.
//!
//! Exercises the rejection paths of `POST /v1/slots`, all of which fire
//! before the overlap query reaches the database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

async fn post_booking(body: String) -> Result<(StatusCode, serde_json::Value), anyhow::Error> {
    let app = common::test_router();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/slots")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))?,
        )
        .await?;

    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes)?;
    Ok((status, json))
}

/// A start time safely beyond the default 48 hour lead window, placed
/// mid-day so a two hour show stays inside one calendar day.
fn far_future_start() -> DateTime<Utc> {
    (Utc::now() + Duration::days(5))
        .date_naive()
        .and_hms_opt(10, 0, 0)
        .unwrap()
        .and_utc()
}

#[tokio::test]
async fn test_malformed_body_returns_400() -> Result<(), anyhow::Error> {
    let (status, body) = post_booking("not json".to_string()).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    Ok(())
}

#[tokio::test]
async fn test_unknown_field_returns_400() -> Result<(), anyhow::Error> {
    let start = far_future_start();
    let (status, _) = post_booking(
        json!({
            "dj_email": "dj@example.com",
            "show_name": "Late Night Frequencies",
            "start_time": start,
            "end_time": start + Duration::hours(2),
            "surprise": true,
        })
        .to_string(),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_invalid_email_returns_400() -> Result<(), anyhow::Error> {
    let start = far_future_start();
    let (status, body) = post_booking(
        json!({
            "dj_email": "not-an-email",
            "show_name": "Late Night Frequencies",
            "start_time": start,
            "end_time": start + Duration::hours(2),
        })
        .to_string(),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    Ok(())
}

#[tokio::test]
async fn test_inverted_interval_returns_400() -> Result<(), anyhow::Error> {
    let start = far_future_start();
    let (status, _) = post_booking(
        json!({
            "dj_email": "dj@example.com",
            "show_name": "Late Night Frequencies",
            "start_time": start,
            "end_time": start - Duration::hours(2),
        })
        .to_string(),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_start_inside_lead_window_returns_400() -> Result<(), anyhow::Error> {
    // One hour out, default lead time is 48 hours
    let start = Utc::now() + Duration::hours(1);
    let (status, body) = post_booking(
        json!({
            "dj_email": "dj@example.com",
            "show_name": "Late Night Frequencies",
            "start_time": start,
            "end_time": start + Duration::minutes(30),
        })
        .to_string(),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        "Bookings must start after the minimum lead time"
    );

    Ok(())
}

#[tokio::test]
async fn test_day_boundary_crossing_returns_400() -> Result<(), anyhow::Error> {
    let start = far_future_start() + Duration::hours(13); // 23:00 UTC
    let (status, body) = post_booking(
        json!({
            "dj_email": "dj@example.com",
            "show_name": "Late Night Frequencies",
            "start_time": start,
            "end_time": start + Duration::hours(2),
        })
        .to_string(),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        "Bookings may not cross a day boundary"
    );

    Ok(())
}

//! Provider HTTP client tests against a local mock server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use broadcast_controller::errors::BcError;
use broadcast_controller::services::{
    CreateTransferRequest, EmailMessage, HttpMailClient, HttpPaymentsClient, HttpStreamingClient,
    MailClient, PaymentsClient, StartSessionRequest, StreamingClient,
};
use secrecy::SecretString;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_key() -> SecretString {
    SecretString::from("sk_provider_test")
}

#[tokio::test]
async fn test_start_session_success() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/sessions"))
        .and(header("Authorization", "Bearer sk_provider_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "egress_id": "EG_abc123",
            "stream_url": "rtmp://ingest.example/live/abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpStreamingClient::new(server.uri(), api_key())?;
    let info = client
        .start_session(&StartSessionRequest {
            room_name: "slot-abc".to_string(),
            record: true,
        })
        .await?;

    assert_eq!(info.egress_id, "EG_abc123");
    assert_eq!(info.stream_url, "rtmp://ingest.example/live/abc");

    Ok(())
}

#[tokio::test]
async fn test_start_session_server_error_is_unavailable() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/sessions"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = HttpStreamingClient::new(server.uri(), api_key())?;
    let result = client
        .start_session(&StartSessionRequest {
            room_name: "slot-abc".to_string(),
            record: true,
        })
        .await;

    assert!(matches!(result, Err(BcError::ServiceUnavailable(_))));

    Ok(())
}

#[tokio::test]
async fn test_start_session_client_error_is_internal() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/sessions"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad room"))
        .mount(&server)
        .await;

    let client = HttpStreamingClient::new(server.uri(), api_key())?;
    let result = client
        .start_session(&StartSessionRequest {
            room_name: "slot-abc".to_string(),
            record: true,
        })
        .await;

    assert!(matches!(result, Err(BcError::Internal)));

    Ok(())
}

#[tokio::test]
async fn test_stop_session_treats_404_as_stopped() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/sessions/EG_gone/stop"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpStreamingClient::new(server.uri(), api_key())?;
    client.stop_session("EG_gone").await?;

    Ok(())
}

#[tokio::test]
async fn test_session_status_parses_state() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/sessions/EG_running"))
        .and(header("Authorization", "Bearer sk_provider_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"active": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpStreamingClient::new(server.uri(), api_key())?;
    let status = client.session_status("EG_running").await?;

    assert!(status.active);

    Ok(())
}

#[tokio::test]
async fn test_session_status_treats_404_as_inactive() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/sessions/EG_gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = HttpStreamingClient::new(server.uri(), api_key())?;
    let status = client.session_status("EG_gone").await?;

    assert!(!status.active);

    Ok(())
}

#[tokio::test]
async fn test_create_transfer_sends_idempotency_key() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    let tip_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/transfers"))
        .and(header("Idempotency-Key", tip_id.to_string()))
        .and(header("Authorization", "Bearer sk_provider_test"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"transfer_id": "tr_live_1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpPaymentsClient::new(server.uri(), api_key())?;
    let response = client
        .create_transfer(&CreateTransferRequest {
            amount_cents: 500,
            destination: "acct_dest".to_string(),
            idempotency_key: tip_id,
        })
        .await?;

    assert_eq!(response.transfer_id, "tr_live_1");

    Ok(())
}

#[tokio::test]
async fn test_destination_status_parses_readiness() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/accounts/acct_half"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "charges_enabled": true,
            "payouts_enabled": false
        })))
        .mount(&server)
        .await;

    let client = HttpPaymentsClient::new(server.uri(), api_key())?;
    let status = client.destination_status("acct_half").await?;

    assert!(!status.is_ready());
    assert!(status.charges_enabled);

    Ok(())
}

#[tokio::test]
async fn test_destination_status_missing_account_is_not_found() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/accounts/acct_missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = HttpPaymentsClient::new(server.uri(), api_key())?;
    let result = client.destination_status("acct_missing").await;

    assert!(matches!(result, Err(BcError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_send_email_posts_message() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .and(header("Authorization", "Bearer sk_provider_test"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpMailClient::new(server.uri(), api_key())?;
    client
        .send_email(&EmailMessage {
            template: "show-archived".to_string(),
            recipient: "dj@example.com".to_string(),
            data: json!({"slug": "late-night"}),
        })
        .await?;

    Ok(())
}

#[tokio::test]
async fn test_send_email_server_error_is_unavailable() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = HttpMailClient::new(server.uri(), api_key())?;
    let result = client
        .send_email(&EmailMessage {
            template: "show-archived".to_string(),
            recipient: "dj@example.com".to_string(),
            data: json!({}),
        })
        .await;

    assert!(matches!(result, Err(BcError::ServiceUnavailable(_))));

    Ok(())
}

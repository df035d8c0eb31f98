//! Transactional mail client.
//!
//! Notification sends are fire-and-forget: failures are recorded on the
//! outbox row and retried by the dispatcher, never surfaced to request
//! handlers.

use crate::errors::BcError;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Default timeout for mail requests in seconds.
const MAIL_REQUEST_TIMEOUT_SECS: u64 = 10;

/// A templated email send.
#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    /// Template identifier, e.g. "show-archived".
    pub template: String,

    /// Recipient address.
    pub recipient: String,

    /// Template variables.
    pub data: Value,
}

/// Seam over the mail provider.
#[async_trait]
pub trait MailClient: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), BcError>;
}

/// HTTP client for the mail provider API.
#[derive(Clone)]
pub struct HttpMailClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpMailClient {
    /// Create a new mail client.
    ///
    /// # Errors
    ///
    /// Returns `BcError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String, api_key: SecretString) -> Result<Self, BcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(MAIL_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "bc.services.mail_client", error = %e, "Failed to build HTTP client");
                BcError::Internal
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl MailClient for HttpMailClient {
    #[instrument(skip(self, message), fields(template = %message.template))]
    async fn send_email(&self, message: &EmailMessage) -> Result<(), BcError> {
        let url = format!("{}/v1/send", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(message)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "bc.services.mail_client", error = %e, "Mail request failed");
                BcError::ServiceUnavailable("Mail provider is unavailable".to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let error_body = response.text().await.unwrap_or_default();
            warn!(target: "bc.services.mail_client", status = %status, body = %error_body, "Mail provider rejected send");
            Err(BcError::ServiceUnavailable(
                "Mail provider is unavailable".to_string(),
            ))
        }
    }
}

/// In-memory mail client for tests.
#[derive(Default)]
pub struct MockMailClient {
    /// Messages passed to `send_email`, in call order.
    pub sent: std::sync::Mutex<Vec<EmailMessage>>,

    /// When true, sends fail as unavailable.
    pub fail_send: std::sync::atomic::AtomicBool,
}

impl MockMailClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MailClient for MockMailClient {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), BcError> {
        if self.fail_send.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BcError::ServiceUnavailable(
                "Mail provider is unavailable".to_string(),
            ));
        }

        self.sent
            .lock()
            .map_err(|_| BcError::Internal)?
            .push(message.clone());
        Ok(())
    }
}

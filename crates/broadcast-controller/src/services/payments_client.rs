//! Payments provider HTTP client.
//!
//! Creates tip transfers and checks payout destination readiness. Transfer
//! creation carries the tip id as an idempotency key so a retried sweep can
//! never double-pay.

use crate::errors::BcError;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument, warn};
use uuid::Uuid;

/// Default timeout for payments requests in seconds.
const PAYMENTS_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Request to create a transfer to a payout destination.
#[derive(Debug, Clone, Serialize)]
pub struct CreateTransferRequest {
    /// Amount in cents.
    pub amount_cents: i64,

    /// Provider payout account the funds go to.
    pub destination: String,

    /// Tip id; the provider deduplicates on this key.
    pub idempotency_key: Uuid,
}

/// Response for a created (or replayed) transfer.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferResponse {
    /// Provider transfer identifier.
    pub transfer_id: String,
}

/// Readiness of a payout destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DestinationStatus {
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
}

impl DestinationStatus {
    /// A destination only receives transfers when fully enabled.
    pub fn is_ready(&self) -> bool {
        self.charges_enabled && self.payouts_enabled
    }
}

/// Seam over the payments provider so the payout sweep can be exercised
/// without the real API.
#[async_trait]
pub trait PaymentsClient: Send + Sync {
    /// Create a transfer. Safe to retry with the same idempotency key.
    async fn create_transfer(
        &self,
        request: &CreateTransferRequest,
    ) -> Result<TransferResponse, BcError>;

    /// Fetch the readiness of a payout destination.
    async fn destination_status(&self, destination: &str) -> Result<DestinationStatus, BcError>;
}

/// HTTP client for the payments provider API.
#[derive(Clone)]
pub struct HttpPaymentsClient {
    /// HTTP client with configured timeouts.
    client: Client,

    /// Base URL for the payments API.
    base_url: String,

    /// Payments API key.
    api_key: SecretString,
}

impl HttpPaymentsClient {
    /// Create a new payments client.
    ///
    /// # Errors
    ///
    /// Returns `BcError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String, api_key: SecretString) -> Result<Self, BcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PAYMENTS_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "bc.services.payments_client", error = %e, "Failed to build HTTP client");
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
impl PaymentsClient for HttpPaymentsClient {
    #[instrument(skip(self, request), fields(idempotency_key = %request.idempotency_key))]
    async fn create_transfer(
        &self,
        request: &CreateTransferRequest,
    ) -> Result<TransferResponse, BcError> {
        let url = format!("{}/v1/transfers", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .header("Idempotency-Key", request.idempotency_key.to_string())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "bc.services.payments_client", error = %e, "Payments request failed");
                BcError::ServiceUnavailable("Payments provider is unavailable".to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| {
                error!(target: "bc.services.payments_client", error = %e, "Failed to parse payments response");
                BcError::Internal
            })
        } else if status.is_server_error() {
            warn!(target: "bc.services.payments_client", status = %status, "Payments provider returned server error");
            Err(BcError::ServiceUnavailable(
                "Payments provider is unavailable".to_string(),
            ))
        } else {
            let error_body = response.text().await.unwrap_or_default();
            warn!(target: "bc.services.payments_client", status = %status, body = %error_body, "Payments provider rejected transfer");
            Err(BcError::Internal)
        }
    }

    #[instrument(skip(self))]
    async fn destination_status(&self, destination: &str) -> Result<DestinationStatus, BcError> {
        let url = format!("{}/v1/accounts/{}", self.base_url, destination);

        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| {
                warn!(target: "bc.services.payments_client", error = %e, "Payments request failed");
                BcError::ServiceUnavailable("Payments provider is unavailable".to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| {
                error!(target: "bc.services.payments_client", error = %e, "Failed to parse payments response");
                BcError::Internal
            })
        } else if status.as_u16() == 404 {
            warn!(target: "bc.services.payments_client", destination = %destination, "Payout destination not found");
            Err(BcError::NotFound("Payout destination not found".to_string()))
        } else if status.is_server_error() {
            warn!(target: "bc.services.payments_client", status = %status, "Payments provider returned server error");
            Err(BcError::ServiceUnavailable(
                "Payments provider is unavailable".to_string(),
            ))
        } else {
            warn!(target: "bc.services.payments_client", status = %status, "Unexpected payments response");
            Err(BcError::Internal)
        }
    }
}

/// In-memory payments client for tests.
#[derive(Default)]
pub struct MockPaymentsClient {
    /// Transfers passed to `create_transfer`, in call order.
    pub transfers: std::sync::Mutex<Vec<CreateTransferRequest>>,

    /// Destinations queried via `destination_status`, in call order.
    pub status_queries: std::sync::Mutex<Vec<String>>,

    /// Destinations that report as not ready.
    pub disabled_destinations: std::sync::Mutex<Vec<String>>,

    /// Idempotency keys whose transfer creation fails.
    pub failing_keys: std::sync::Mutex<Vec<Uuid>>,
}

impl MockPaymentsClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentsClient for MockPaymentsClient {
    async fn create_transfer(
        &self,
        request: &CreateTransferRequest,
    ) -> Result<TransferResponse, BcError> {
        let failing = self.failing_keys.lock().map_err(|_| BcError::Internal)?;
        if failing.contains(&request.idempotency_key) {
            return Err(BcError::ServiceUnavailable(
                "Payments provider is unavailable".to_string(),
            ));
        }
        drop(failing);

        self.transfers
            .lock()
            .map_err(|_| BcError::Internal)?
            .push(request.clone());

        Ok(TransferResponse {
            transfer_id: format!("tr_mock_{}", request.idempotency_key.simple()),
        })
    }

    async fn destination_status(&self, destination: &str) -> Result<DestinationStatus, BcError> {
        self.status_queries
            .lock()
            .map_err(|_| BcError::Internal)?
            .push(destination.to_string());

        let disabled = self
            .disabled_destinations
            .lock()
            .map_err(|_| BcError::Internal)?;
        let ready = !disabled.iter().any(|d| d == destination);

        Ok(DestinationStatus {
            charges_enabled: ready,
            payouts_enabled: ready,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_status_readiness() {
        let ready = DestinationStatus {
            charges_enabled: true,
            payouts_enabled: true,
        };
        assert!(ready.is_ready());

        let partial = DestinationStatus {
            charges_enabled: true,
            payouts_enabled: false,
        };
        assert!(!partial.is_ready());
    }

    #[test]
    fn test_transfer_request_serialization() {
        let request = CreateTransferRequest {
            amount_cents: 500,
            destination: "acct_123".to_string(),
            idempotency_key: Uuid::nil(),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"amount_cents\":500"));
        assert!(json.contains("\"destination\":\"acct_123\""));
    }

    #[tokio::test]
    async fn test_mock_transfer_and_status() {
        let mock = MockPaymentsClient::new();
        mock.disabled_destinations
            .lock()
            .unwrap()
            .push("acct_disabled".to_string());

        let ready = mock.destination_status("acct_ok").await.unwrap();
        assert!(ready.is_ready());
        let not_ready = mock.destination_status("acct_disabled").await.unwrap();
        assert!(!not_ready.is_ready());

        let response = mock
            .create_transfer(&CreateTransferRequest {
                amount_cents: 250,
                destination: "acct_ok".to_string(),
                idempotency_key: Uuid::nil(),
            })
            .await
            .unwrap();

        assert!(response.transfer_id.starts_with("tr_mock_"));
        assert_eq!(mock.transfers.lock().unwrap().len(), 1);
    }
}

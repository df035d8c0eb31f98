//! Streaming provider HTTP client.
//!
//! Starts and stops media sessions (room plus recording egress) against the
//! external streaming provider's control API.
//!
//! # Security
//!
//! - Authenticates with the provider API key
//! - Timeouts prevent hanging connections
//! - Errors are logged server-side with generic messages returned

use crate::errors::BcError;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Default timeout for provider requests in seconds.
const STREAMING_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Request to start a media session.
#[derive(Debug, Clone, Serialize)]
pub struct StartSessionRequest {
    /// Room to create or join.
    pub room_name: String,

    /// Whether a recording egress should start with the room.
    pub record: bool,
}

/// Provider handles for a started media session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    /// Provider-assigned recording egress identifier.
    pub egress_id: String,

    /// Ingest URL the broadcaster streams to.
    pub stream_url: String,
}

/// Point-in-time provider state for an egress.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStatus {
    /// Whether the egress is still running on the provider side.
    pub active: bool,
}

/// Seam over the streaming provider so session orchestration can be
/// exercised without the real API.
#[async_trait]
pub trait StreamingClient: Send + Sync {
    /// Start a media session with recording for the given room.
    async fn start_session(&self, request: &StartSessionRequest) -> Result<SessionInfo, BcError>;

    /// Stop the recording egress for a session.
    ///
    /// Idempotent: an egress the provider no longer knows is treated as
    /// already stopped.
    async fn stop_session(&self, egress_id: &str) -> Result<(), BcError>;

    /// Poll the current state of an egress.
    ///
    /// An egress the provider no longer knows reports as inactive.
    async fn session_status(&self, egress_id: &str) -> Result<SessionStatus, BcError>;
}

/// HTTP client for the streaming provider control API.
#[derive(Clone)]
pub struct HttpStreamingClient {
    /// HTTP client with configured timeouts.
    client: Client,

    /// Base URL for the provider API.
    base_url: String,

    /// Provider API key.
    api_key: SecretString,
}

impl HttpStreamingClient {
    /// Create a new streaming client.
    ///
    /// # Errors
    ///
    /// Returns `BcError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String, api_key: SecretString) -> Result<Self, BcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(STREAMING_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "bc.services.streaming_client", error = %e, "Failed to build HTTP client");
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
impl StreamingClient for HttpStreamingClient {
    #[instrument(skip(self, request), fields(room_name = %request.room_name))]
    async fn start_session(&self, request: &StartSessionRequest) -> Result<SessionInfo, BcError> {
        let url = format!("{}/v1/sessions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "bc.services.streaming_client", error = %e, "Provider request failed");
                BcError::ServiceUnavailable("Streaming provider is unavailable".to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| {
                error!(target: "bc.services.streaming_client", error = %e, "Failed to parse provider response");
                BcError::Internal
            })
        } else if status.is_server_error() {
            warn!(target: "bc.services.streaming_client", status = %status, "Provider returned server error");
            Err(BcError::ServiceUnavailable(
                "Streaming provider is unavailable".to_string(),
            ))
        } else {
            let error_body = response.text().await.unwrap_or_default();
            warn!(target: "bc.services.streaming_client", status = %status, body = %error_body, "Provider rejected session start");
            Err(BcError::Internal)
        }
    }

    #[instrument(skip(self))]
    async fn stop_session(&self, egress_id: &str) -> Result<(), BcError> {
        let url = format!("{}/v1/sessions/{}/stop", self.base_url, egress_id);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| {
                warn!(target: "bc.services.streaming_client", error = %e, "Provider request failed");
                BcError::ServiceUnavailable("Streaming provider is unavailable".to_string())
            })?;

        let status = response.status();
        if status.is_success() || status.as_u16() == 404 {
            // 404 means the egress already finished on the provider side
            Ok(())
        } else if status.is_server_error() {
            warn!(target: "bc.services.streaming_client", status = %status, egress_id = %egress_id, "Provider returned server error on stop");
            Err(BcError::ServiceUnavailable(
                "Streaming provider is unavailable".to_string(),
            ))
        } else {
            warn!(target: "bc.services.streaming_client", status = %status, egress_id = %egress_id, "Unexpected provider response on stop");
            Err(BcError::Internal)
        }
    }

    #[instrument(skip(self))]
    async fn session_status(&self, egress_id: &str) -> Result<SessionStatus, BcError> {
        let url = format!("{}/v1/sessions/{}", self.base_url, egress_id);

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
                warn!(target: "bc.services.streaming_client", error = %e, "Provider request failed");
                BcError::ServiceUnavailable("Streaming provider is unavailable".to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| {
                error!(target: "bc.services.streaming_client", error = %e, "Failed to parse provider response");
                BcError::Internal
            })
        } else if status.as_u16() == 404 {
            // The provider already timed the egress out
            Ok(SessionStatus { active: false })
        } else if status.is_server_error() {
            warn!(target: "bc.services.streaming_client", status = %status, egress_id = %egress_id, "Provider returned server error on status poll");
            Err(BcError::ServiceUnavailable(
                "Streaming provider is unavailable".to_string(),
            ))
        } else {
            warn!(target: "bc.services.streaming_client", status = %status, egress_id = %egress_id, "Unexpected provider response on status poll");
            Err(BcError::Internal)
        }
    }
}

/// In-memory streaming client for tests.
#[derive(Default)]
pub struct MockStreamingClient {
    /// Rooms passed to `start_session`, in call order.
    pub started: std::sync::Mutex<Vec<String>>,

    /// Egress ids passed to `stop_session`, in call order.
    pub stopped: std::sync::Mutex<Vec<String>>,

    /// When true, `start_session` fails as unavailable.
    pub fail_start: std::sync::atomic::AtomicBool,

    /// When true, `stop_session` fails as unavailable.
    pub fail_stop: std::sync::atomic::AtomicBool,
}

impl MockStreamingClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamingClient for MockStreamingClient {
    async fn start_session(&self, request: &StartSessionRequest) -> Result<SessionInfo, BcError> {
        if self.fail_start.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BcError::ServiceUnavailable(
                "Streaming provider is unavailable".to_string(),
            ));
        }

        let mut started = self
            .started
            .lock()
            .map_err(|_| BcError::Internal)?;
        started.push(request.room_name.clone());
        let n = started.len();

        Ok(SessionInfo {
            egress_id: format!("EG_MOCK_{}", n),
            stream_url: format!("rtmp://mock.local/{}", request.room_name),
        })
    }

    async fn stop_session(&self, egress_id: &str) -> Result<(), BcError> {
        if self.fail_stop.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BcError::ServiceUnavailable(
                "Streaming provider is unavailable".to_string(),
            ));
        }

        self.stopped
            .lock()
            .map_err(|_| BcError::Internal)?
            .push(egress_id.to_string());
        Ok(())
    }

    async fn session_status(&self, egress_id: &str) -> Result<SessionStatus, BcError> {
        let stopped = self.stopped.lock().map_err(|_| BcError::Internal)?;
        Ok(SessionStatus {
            active: !stopped.iter().any(|id| id == egress_id),
        })
    }
}

//! Outbox dispatcher background task.
//!
//! Delivers queued fire-and-forget side effects (notification emails).
//! Entries that keep failing are parked after a bounded number of attempts
//! and left for operator inspection.
//!
//! # Graceful Shutdown
//!
//! The task supports graceful shutdown via a cancellation token. When the
//! token is cancelled, the task completes its current iteration and exits
//! cleanly.

use crate::models::OutboxRow;
use crate::repositories::OutboxRepository;
use crate::services::{EmailMessage, MailClient};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Default dispatch interval in seconds.
const DEFAULT_DISPATCH_INTERVAL_SECONDS: u64 = 30;

/// Entries fetched per pass.
const DISPATCH_BATCH_SIZE: i64 = 50;

/// Delivery attempts before an entry is parked as failed.
const MAX_DELIVERY_ATTEMPTS: i32 = 5;

/// Configuration for the outbox dispatcher task.
#[derive(Debug, Clone)]
pub struct OutboxDispatcherConfig {
    /// Dispatch interval in seconds.
    pub dispatch_interval_seconds: u64,
}

impl Default for OutboxDispatcherConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_seconds: DEFAULT_DISPATCH_INTERVAL_SECONDS,
        }
    }
}

impl OutboxDispatcherConfig {
    /// Create config from environment variables.
    ///
    /// Environment variables:
    /// - `BC_OUTBOX_DISPATCH_INTERVAL_SECONDS` - Dispatch interval (default: 30)
    pub fn from_env() -> Self {
        let dispatch_interval_seconds = std::env::var("BC_OUTBOX_DISPATCH_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DISPATCH_INTERVAL_SECONDS);

        Self {
            dispatch_interval_seconds,
        }
    }
}

/// Start the outbox dispatcher background task.
#[instrument(skip_all, name = "bc.task.outbox_dispatcher")]
pub async fn start_outbox_dispatcher(
    pool: PgPool,
    mail: Arc<dyn MailClient>,
    config: OutboxDispatcherConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "bc.task.outbox_dispatcher",
        dispatch_interval_seconds = config.dispatch_interval_seconds,
        "Starting outbox dispatcher task"
    );

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.dispatch_interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_dispatch(&pool, mail.as_ref()).await;
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "bc.task.outbox_dispatcher",
                    "Outbox dispatcher task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "bc.task.outbox_dispatcher", "Outbox dispatcher task stopped");
}

/// Run a single dispatch iteration.
///
/// Separated from the main loop to allow direct testing. Per-entry failures
/// are recorded on the row and never stop the batch.
pub(crate) async fn run_dispatch(pool: &PgPool, mail: &dyn MailClient) {
    let entries = match OutboxRepository::fetch_pending(pool, DISPATCH_BATCH_SIZE).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                target: "bc.task.outbox_dispatcher",
                error = %e,
                "Failed to fetch pending outbox entries"
            );
            return;
        }
    };

    for entry in entries {
        match deliver(mail, &entry).await {
            Ok(()) => {
                if let Err(e) = OutboxRepository::mark_sent(pool, entry.outbox_id).await {
                    warn!(
                        target: "bc.task.outbox_dispatcher",
                        outbox_id = %entry.outbox_id,
                        error = %e,
                        "Delivered but failed to mark sent; entry will be redelivered"
                    );
                }
            }
            Err(e) => {
                warn!(
                    target: "bc.task.outbox_dispatcher",
                    outbox_id = %entry.outbox_id,
                    kind = %entry.kind,
                    attempts = entry.attempts,
                    error = %e,
                    "Outbox delivery failed"
                );
                if let Err(e) =
                    OutboxRepository::mark_failed(pool, entry.outbox_id, MAX_DELIVERY_ATTEMPTS)
                        .await
                {
                    warn!(
                        target: "bc.task.outbox_dispatcher",
                        outbox_id = %entry.outbox_id,
                        error = %e,
                        "Failed to record delivery failure"
                    );
                }
            }
        }
    }
}

/// Deliver one outbox entry.
async fn deliver(mail: &dyn MailClient, entry: &OutboxRow) -> Result<(), crate::errors::BcError> {
    match entry.kind.as_str() {
        "show_archived_email" => {
            let recipient = entry
                .payload
                .get("recipient")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if recipient.is_empty() {
                warn!(
                    target: "bc.task.outbox_dispatcher",
                    outbox_id = %entry.outbox_id,
                    "Outbox entry has no recipient; dropping"
                );
                return Ok(());
            }

            mail.send_email(&EmailMessage {
                template: "show-archived".to_string(),
                recipient,
                data: entry.payload.clone(),
            })
            .await
        }
        other => {
            warn!(
                target: "bc.task.outbox_dispatcher",
                outbox_id = %entry.outbox_id,
                kind = %other,
                "Unknown outbox kind; dropping"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::MockMailClient;
    use serde_json::json;
    use uuid::Uuid;

    fn entry(kind: &str, payload: serde_json::Value) -> OutboxRow {
        OutboxRow {
            outbox_id: Uuid::new_v4(),
            kind: kind.to_string(),
            payload,
            status: "pending".to_string(),
            attempts: 0,
        }
    }

    #[tokio::test]
    async fn test_deliver_show_archived() {
        let mock = MockMailClient::new();
        let entry = entry(
            "show_archived_email",
            json!({"recipient": "dj@example.com", "slug": "late-night"}),
        );

        deliver(&mock, &entry).await.unwrap();

        let sent = mock.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent.first().unwrap().recipient, "dj@example.com");
        assert_eq!(sent.first().unwrap().template, "show-archived");
    }

    #[tokio::test]
    async fn test_deliver_drops_unknown_kind() {
        let mock = MockMailClient::new();
        let entry = entry("mystery", json!({}));

        deliver(&mock, &entry).await.unwrap();
        assert!(mock.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_drops_missing_recipient() {
        let mock = MockMailClient::new();
        let entry = entry("show_archived_email", json!({"slug": "late-night"}));

        deliver(&mock, &entry).await.unwrap();
        assert!(mock.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_propagates_provider_failure() {
        let mock = MockMailClient::new();
        mock.fail_send
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let entry = entry(
            "show_archived_email",
            json!({"recipient": "dj@example.com"}),
        );

        assert!(deliver(&mock, &entry).await.is_err());
    }
}

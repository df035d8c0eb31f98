//! Slot expiry sweeper background task.
//!
//! Periodically forces elapsed slots into their terminal states:
//! live/paused slots become `completed`, scheduled slots become `missed`.
//! Egresses left running by abandoned broadcasts are stopped best effort.
//!
//! # Graceful Shutdown
//!
//! The task supports graceful shutdown via a cancellation token. When the
//! token is cancelled, the task completes its current iteration and exits
//! cleanly.

use crate::observability::metrics;
use crate::repositories::SlotsRepository;
use crate::services::media_session::MediaSessionService;
use crate::services::StreamingClient;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Default sweep interval in seconds.
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Configuration for the expiry sweeper task.
#[derive(Debug, Clone)]
pub struct ExpirySweeperConfig {
    /// Sweep interval in seconds.
    pub sweep_interval_seconds: u64,
}

impl Default for ExpirySweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl ExpirySweeperConfig {
    /// Create config from environment variables.
    ///
    /// Environment variables:
    /// - `BC_EXPIRY_SWEEP_INTERVAL_SECONDS` - Sweep interval (default: 60)
    pub fn from_env() -> Self {
        let sweep_interval_seconds = std::env::var("BC_EXPIRY_SWEEP_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECONDS);

        Self {
            sweep_interval_seconds,
        }
    }
}

/// Start the expiry sweeper background task.
///
/// Runs a sweep at the configured interval until the cancellation token is
/// triggered. Overlapping sweeps (slow pass, racing replica) are safe: the
/// status-conditional updates make each transition apply once.
#[instrument(skip_all, name = "bc.task.expiry_sweeper")]
pub async fn start_expiry_sweeper(
    pool: PgPool,
    streaming: Arc<dyn StreamingClient>,
    config: ExpirySweeperConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "bc.task.expiry_sweeper",
        sweep_interval_seconds = config.sweep_interval_seconds,
        "Starting expiry sweeper task"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.sweep_interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_sweep(&pool, streaming.as_ref()).await;
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "bc.task.expiry_sweeper",
                    "Expiry sweeper task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "bc.task.expiry_sweeper", "Expiry sweeper task stopped");
}

/// Run a single sweep iteration.
///
/// Separated from the main loop to allow direct testing.
pub(crate) async fn run_sweep(pool: &PgPool, streaming: &dyn StreamingClient) {
    let now = Utc::now();

    match SlotsRepository::expire_running(pool, now).await {
        Ok(expired) => {
            if !expired.is_empty() {
                metrics::record_expiry_transitions("completed", expired.len() as u64);
                info!(
                    target: "bc.task.expiry_sweeper",
                    completed_count = expired.len(),
                    "Completed elapsed broadcasts"
                );

                for slot in &expired {
                    MediaSessionService::stop_best_effort(
                        streaming,
                        slot.recording_egress_id.as_deref(),
                    )
                    .await;
                }
            }
        }
        Err(e) => {
            warn!(
                target: "bc.task.expiry_sweeper",
                error = %e,
                "Failed to complete elapsed broadcasts"
            );
        }
    }

    match SlotsRepository::expire_scheduled(pool, now).await {
        Ok(count) => {
            if count > 0 {
                metrics::record_expiry_transitions("missed", count);
                info!(
                    target: "bc.task.expiry_sweeper",
                    missed_count = count,
                    "Marked elapsed never-live slots as missed"
                );
            }
        }
        Err(e) => {
            warn!(
                target: "bc.task.expiry_sweeper",
                error = %e,
                "Failed to mark missed slots"
            );
        }
    }
}

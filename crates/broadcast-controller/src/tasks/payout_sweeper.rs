//! Tip payout sweeper background task.
//!
//! Periodically runs `PayoutService::run_sweep` to move succeeded,
//! identity-resolved tips to their broadcasters.
//!
//! # Graceful Shutdown
//!
//! The task supports graceful shutdown via a cancellation token. When the
//! token is cancelled, the task completes its current iteration and exits
//! cleanly.

use crate::services::{DestinationStatusCache, PaymentsClient, PayoutService};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Default sweep interval in seconds (5 minutes).
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

/// Configuration for the payout sweeper task.
#[derive(Debug, Clone)]
pub struct PayoutSweeperConfig {
    /// Sweep interval in seconds.
    pub sweep_interval_seconds: u64,
}

impl Default for PayoutSweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl PayoutSweeperConfig {
    /// Create config from environment variables.
    ///
    /// Environment variables:
    /// - `BC_PAYOUT_SWEEP_INTERVAL_SECONDS` - Sweep interval (default: 300)
    pub fn from_env() -> Self {
        let sweep_interval_seconds = std::env::var("BC_PAYOUT_SWEEP_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECONDS);

        Self {
            sweep_interval_seconds,
        }
    }
}

/// Start the payout sweeper background task.
///
/// Transfer idempotency keys and the guarded settle write make overlapping
/// or rerun passes safe.
#[instrument(skip_all, name = "bc.task.payout_sweeper")]
pub async fn start_payout_sweeper(
    pool: PgPool,
    payments: Arc<dyn PaymentsClient>,
    cache: Arc<DestinationStatusCache>,
    config: PayoutSweeperConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "bc.task.payout_sweeper",
        sweep_interval_seconds = config.sweep_interval_seconds,
        "Starting payout sweeper task"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.sweep_interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = PayoutService::run_sweep(&pool, payments.as_ref(), &cache).await {
                    warn!(
                        target: "bc.task.payout_sweeper",
                        error = %e,
                        "Payout sweep pass failed"
                    );
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "bc.task.payout_sweeper",
                    "Payout sweeper task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "bc.task.payout_sweeper", "Payout sweeper task stopped");
}

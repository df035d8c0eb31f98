//! Tip payout sweep.
//!
//! Moves succeeded, identity-resolved tips to their broadcasters. One
//! destination readiness check per broadcaster per pass (TTL cached), one
//! provider transfer per tip with the tip id as idempotency key, and a
//! guarded database write so a tip settles exactly once.
//!
//! Failures are isolated per item: a broadcaster with a broken destination
//! or a single failing transfer never stalls the rest of the pass.

use crate::errors::BcError;
use crate::models::TipRow;
use crate::observability::metrics;
use crate::repositories::{AccountsRepository, TipsRepository};
use crate::services::payments_client::{CreateTransferRequest, PaymentsClient};
use crate::services::status_cache::DestinationStatusCache;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Tips considered per sweep pass.
const SWEEP_BATCH_SIZE: i64 = 500;

/// Outcome counts for one sweep pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PayoutReport {
    pub transferred: u64,
    pub failed: u64,
    pub skipped_destination_not_ready: u64,
    pub skipped_no_destination: u64,
}

/// Group transfer candidates by broadcaster identity.
///
/// BTreeMap keeps per-broadcaster processing order deterministic. Tips
/// whose stored identity is not a valid UUID are dropped with a warning;
/// they stay pending and surface again next pass.
pub fn group_by_dj(tips: Vec<TipRow>) -> BTreeMap<Uuid, Vec<TipRow>> {
    let mut grouped: BTreeMap<Uuid, Vec<TipRow>> = BTreeMap::new();
    for tip in tips {
        match Uuid::parse_str(&tip.dj_user_id) {
            Ok(dj_user_id) => grouped.entry(dj_user_id).or_default().push(tip),
            Err(_) => {
                warn!(
                    target: "bc.services.payouts",
                    tip_id = %tip.tip_id,
                    "Tip carries a malformed dj_user_id; skipping"
                );
            }
        }
    }
    grouped
}

/// Tip payout service.
pub struct PayoutService;

impl PayoutService {
    /// Run one sweep pass.
    #[instrument(skip_all, name = "bc.payouts.sweep")]
    pub async fn run_sweep(
        pool: &PgPool,
        payments: &dyn PaymentsClient,
        cache: &DestinationStatusCache,
    ) -> Result<PayoutReport, BcError> {
        let candidates = TipsRepository::find_transfer_candidates(pool, SWEEP_BATCH_SIZE).await?;
        let mut report = PayoutReport::default();

        for (dj_user_id, tips) in group_by_dj(candidates) {
            Self::sweep_dj(pool, payments, cache, dj_user_id, tips, &mut report).await;
        }

        if report != PayoutReport::default() {
            info!(
                target: "bc.services.payouts",
                transferred = report.transferred,
                failed = report.failed,
                skipped_not_ready = report.skipped_destination_not_ready,
                skipped_no_destination = report.skipped_no_destination,
                "Payout sweep pass completed"
            );
        }

        Ok(report)
    }

    /// Process one broadcaster's tips. Never propagates item failures.
    async fn sweep_dj(
        pool: &PgPool,
        payments: &dyn PaymentsClient,
        cache: &DestinationStatusCache,
        dj_user_id: Uuid,
        tips: Vec<TipRow>,
        report: &mut PayoutReport,
    ) {
        let account = match AccountsRepository::find_by_id(pool, dj_user_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(
                    target: "bc.services.payouts",
                    dj_user_id = %dj_user_id,
                    "Tips reference an account that no longer exists"
                );
                report.skipped_no_destination += tips.len() as u64;
                metrics::record_payout_transfer("skipped", Some("missing_account"));
                return;
            }
            Err(e) => {
                warn!(target: "bc.services.payouts", dj_user_id = %dj_user_id, error = %e, "Account lookup failed");
                report.failed += tips.len() as u64;
                return;
            }
        };

        let Some(destination) = account.payout_account_id else {
            // Broadcaster has not finished payout onboarding; tips wait.
            report.skipped_no_destination += tips.len() as u64;
            metrics::record_payout_transfer("skipped", Some("no_destination"));
            return;
        };

        let now = Utc::now();
        let status = match cache.get(&destination, now).await {
            Some(status) => status,
            None => match payments.destination_status(&destination).await {
                Ok(status) => {
                    cache.put(&destination, status, now).await;
                    status
                }
                Err(e) => {
                    warn!(
                        target: "bc.services.payouts",
                        dj_user_id = %dj_user_id,
                        error = %e,
                        "Destination status check failed"
                    );
                    report.failed += tips.len() as u64;
                    return;
                }
            },
        };

        if !status.is_ready() {
            report.skipped_destination_not_ready += tips.len() as u64;
            metrics::record_payout_transfer("skipped", Some("destination_not_ready"));
            return;
        }

        for tip in tips {
            match Self::transfer_tip(pool, payments, &destination, &tip).await {
                Ok(()) => {
                    report.transferred += 1;
                    metrics::record_payout_transfer("transferred", None);
                }
                Err(e) => {
                    warn!(
                        target: "bc.services.payouts",
                        tip_id = %tip.tip_id,
                        error = %e,
                        "Tip transfer failed; will retry next pass"
                    );
                    report.failed += 1;
                    metrics::record_payout_transfer("failed", Some("provider_error"));
                }
            }
        }
    }

    /// Transfer a single tip and settle it.
    async fn transfer_tip(
        pool: &PgPool,
        payments: &dyn PaymentsClient,
        destination: &str,
        tip: &TipRow,
    ) -> Result<(), BcError> {
        let response = payments
            .create_transfer(&CreateTransferRequest {
                amount_cents: tip.amount_cents,
                destination: destination.to_string(),
                idempotency_key: tip.tip_id,
            })
            .await?;

        let settled =
            TipsRepository::mark_transferred(pool, tip.tip_id, &response.transfer_id, Utc::now())
                .await?;
        if !settled {
            // A concurrent pass settled this tip first; the provider call
            // was deduplicated by the idempotency key.
            warn!(
                target: "bc.services.payouts",
                tip_id = %tip.tip_id,
                "Tip was already settled by another pass"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{PayoutStatus, TIP_STATUS_SUCCEEDED};

    fn candidate(dj_user_id: &str, amount_cents: i64) -> TipRow {
        TipRow {
            tip_id: Uuid::new_v4(),
            dj_email: "dj@example.com".to_string(),
            dj_user_id: dj_user_id.to_string(),
            amount_cents,
            status: TIP_STATUS_SUCCEEDED.to_string(),
            payout_status: PayoutStatus::Pending,
            transfer_id: None,
            transferred_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_group_by_dj_splits_broadcasters() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let tips = vec![
            candidate(&a.to_string(), 100),
            candidate(&b.to_string(), 200),
            candidate(&a.to_string(), 300),
        ];

        let grouped = group_by_dj(tips);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.get(&a).unwrap().len(), 2);
        assert_eq!(grouped.get(&b).unwrap().len(), 1);
    }

    #[test]
    fn test_group_by_dj_drops_malformed_identity() {
        let tips = vec![candidate("not-a-uuid", 100)];
        assert!(group_by_dj(tips).is_empty());
    }

    #[test]
    fn test_group_by_dj_preserves_order_within_group() {
        let a = Uuid::new_v4();
        let tips = vec![candidate(&a.to_string(), 100), candidate(&a.to_string(), 200)];

        let grouped = group_by_dj(tips);
        let amounts: Vec<i64> = grouped
            .get(&a)
            .unwrap()
            .iter()
            .map(|t| t.amount_cents)
            .collect();
        assert_eq!(amounts, vec![100, 200]);
    }
}

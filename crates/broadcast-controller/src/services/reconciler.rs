//! Identity reconciliation.
//!
//! When an account is created or verified for an email that already has
//! history, this service back-fills the durable account id across that
//! history: top-level slot ownership, denormalized co-broadcaster entries,
//! and tips still carrying the pending sentinel.
//!
//! Work is chunked and each chunk commits independently, so a crash mid-run
//! loses at most one chunk of progress and a rerun picks up where it
//! stopped. Guards (`dj_user_id IS NULL`, sentinel equality) make every
//! chunk idempotent.

use crate::errors::BcError;
use crate::models::{AccountRow, CoDj, ReconcileSummary};
use crate::observability::metrics;
use crate::repositories::{SlotsRepository, TipsRepository};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

/// Rows updated per chunk.
const CHUNK_SIZE: i64 = 100;

/// Link unlinked co-broadcaster entries matching an email.
///
/// Entries that already carry a user id are left alone, even when it
/// differs from `user_id`. Returns the number of entries changed.
pub fn link_co_dj_entries(co_djs: &mut [CoDj], email: &str, user_id: Uuid) -> u64 {
    let mut changed = 0;
    for entry in co_djs.iter_mut() {
        if entry.email == email && entry.user_id.is_none() {
            entry.user_id = Some(user_id);
            changed += 1;
        }
    }
    changed
}

/// Identity reconciliation service.
pub struct ReconcilerService;

impl ReconcilerService {
    /// Back-fill an account's identity across slots, co-broadcaster
    /// entries, and tips.
    #[instrument(skip_all, name = "bc.reconciler.reconcile_account", fields(account_id = %account.account_id))]
    pub async fn reconcile_account(
        pool: &PgPool,
        account: &AccountRow,
    ) -> Result<ReconcileSummary, BcError> {
        let mut summary = ReconcileSummary::default();

        loop {
            let updated = SlotsRepository::attach_dj_user_chunk(
                pool,
                &account.email,
                account.account_id,
                CHUNK_SIZE,
            )
            .await?;
            summary.slots_linked += updated;
            if updated < CHUNK_SIZE as u64 {
                break;
            }
        }

        loop {
            let slots =
                SlotsRepository::find_unlinked_co_dj_slots(pool, &account.email, CHUNK_SIZE)
                    .await?;
            let batch_len = slots.len();

            for (slot_id, mut co_djs) in slots {
                let changed = link_co_dj_entries(&mut co_djs, &account.email, account.account_id);
                if changed > 0 {
                    SlotsRepository::update_co_djs(pool, slot_id, &co_djs).await?;
                    summary.co_dj_links += changed;
                }
            }

            if batch_len < CHUNK_SIZE as usize {
                break;
            }
        }

        loop {
            let updated = TipsRepository::resolve_pending_chunk(
                pool,
                &account.email,
                account.account_id,
                CHUNK_SIZE,
            )
            .await?;
            summary.tips_resolved += updated;
            if updated < CHUNK_SIZE as u64 {
                break;
            }
        }

        metrics::record_reconciliation("slots", summary.slots_linked);
        metrics::record_reconciliation("co_djs", summary.co_dj_links);
        metrics::record_reconciliation("tips", summary.tips_resolved);

        info!(
            target: "bc.services.reconciler",
            account_id = %account.account_id,
            slots_linked = summary.slots_linked,
            co_dj_links = summary.co_dj_links,
            tips_resolved = summary.tips_resolved,
            "Identity reconciliation completed"
        );

        Ok(summary)
    }
}

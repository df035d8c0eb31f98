//! Tips repository for database operations.
//!
//! Tips are financial records: identity resolution flips the pending
//! sentinel exactly once, and payout writes are guarded so a tip can never
//! be transferred twice.

use crate::errors::BcError;
use crate::models::{PayoutStatus, TipRow, PENDING_DJ_USER_ID};
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const TIP_COLUMNS: &str = r#"
    tip_id, dj_email, dj_user_id, amount_cents, status,
    payout_status, transfer_id, transferred_at, created_at
"#;

/// Tips repository for database operations.
pub struct TipsRepository;

impl TipsRepository {
    /// Fetch transfer candidates: succeeded, unpaid, resolved identity.
    #[instrument(skip_all, name = "bc.repo.find_transfer_candidates")]
    pub async fn find_transfer_candidates(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<TipRow>, BcError> {
        let start = Instant::now();

        let rows = sqlx::query(&format!(
            r#"
            SELECT {TIP_COLUMNS}
            FROM tips
            WHERE status = 'succeeded'
              AND payout_status = 'pending'
              AND dj_user_id != $1
            ORDER BY created_at
            LIMIT $2
            "#
        ))
        .bind(PENDING_DJ_USER_ID)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("find_transfer_candidates", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("find_transfer_candidates", "success", start.elapsed());
        rows.into_iter().map(map_row_to_tip).collect()
    }

    /// Flip a bounded chunk of succeeded pending-identity tips for one
    /// broadcaster to their resolved account id, marking them payable.
    /// Failed or refunded captures keep the sentinel and never enter the
    /// payout pipeline. Returns the number of tips updated.
    #[instrument(skip_all, name = "bc.repo.resolve_pending_chunk")]
    pub async fn resolve_pending_chunk(
        pool: &PgPool,
        dj_email: &str,
        account_id: Uuid,
        chunk_size: i64,
    ) -> Result<u64, BcError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            UPDATE tips
            SET dj_user_id = $2, payout_status = 'pending', updated_at = NOW()
            WHERE tip_id IN (
                SELECT tip_id FROM tips
                WHERE dj_email = $1 AND dj_user_id = $3 AND status = 'succeeded'
                LIMIT $4
            )
            "#,
        )
        .bind(dj_email)
        .bind(account_id.to_string())
        .bind(PENDING_DJ_USER_ID)
        .bind(chunk_size)
        .execute(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("resolve_pending_chunk", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("resolve_pending_chunk", "success", start.elapsed());
        Ok(result.rows_affected())
    }

    /// Mark a tip transferred, guarded on the tip still being pending.
    ///
    /// Returns false when the guard matched nothing, meaning another pass
    /// already settled this tip.
    #[instrument(skip_all, name = "bc.repo.mark_transferred")]
    pub async fn mark_transferred(
        pool: &PgPool,
        tip_id: Uuid,
        transfer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, BcError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            UPDATE tips
            SET payout_status = 'transferred',
                transfer_id = $2,
                transferred_at = $3,
                updated_at = NOW()
            WHERE tip_id = $1 AND payout_status = 'pending'
            "#,
        )
        .bind(tip_id)
        .bind(transfer_id)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("mark_transferred", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("mark_transferred", "success", start.elapsed());
        Ok(result.rows_affected() > 0)
    }
}

/// Map a database row to a TipRow struct.
pub fn map_row_to_tip(row: sqlx::postgres::PgRow) -> Result<TipRow, BcError> {
    let payout_str: String = row.get("payout_status");
    let payout_status = PayoutStatus::parse(&payout_str)
        .ok_or_else(|| BcError::Database(format!("unknown payout status '{payout_str}'")))?;

    Ok(TipRow {
        tip_id: row.get("tip_id"),
        dj_email: row.get("dj_email"),
        dj_user_id: row.get("dj_user_id"),
        amount_cents: row.get("amount_cents"),
        status: row.get("status"),
        payout_status,
        transfer_id: row.get("transfer_id"),
        transferred_at: row.get("transferred_at"),
        created_at: row.get("created_at"),
    })
}

//! Accounts repository for database operations.
//!
//! Handle claiming runs in a transaction with a row lock; the unique
//! constraint on `handle` is the last line of defense against a racing
//! claim.

use crate::errors::BcError;
use crate::models::AccountRow;
use crate::observability::metrics;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = r#"
    account_id, email, handle, is_dj, dj_bio, dj_photo_url, payout_account_id
"#;

/// Accounts repository for database operations.
pub struct AccountsRepository;

impl AccountsRepository {
    /// Look up an account by id.
    #[instrument(skip_all, name = "bc.repo.find_account_by_id")]
    pub async fn find_by_id(
        pool: &PgPool,
        account_id: Uuid,
    ) -> Result<Option<AccountRow>, BcError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = $1"
        ))
        .bind(account_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("find_account_by_id", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("find_account_by_id", "success", start.elapsed());
        Ok(row.map(map_row_to_account))
    }

    /// Look up an account by email.
    #[instrument(skip_all, name = "bc.repo.find_account_by_email")]
    pub async fn find_by_email(
        pool: &PgPool,
        email: &str,
    ) -> Result<Option<AccountRow>, BcError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("find_account_by_email", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("find_account_by_email", "success", start.elapsed());
        Ok(row.map(map_row_to_account))
    }

    /// Atomically claim a handle for an account that has none.
    ///
    /// Locks the account row, re-checks that no handle is set, then writes.
    /// A unique violation from a concurrent claim maps to `HandleTaken`.
    #[instrument(skip_all, name = "bc.repo.claim_handle")]
    pub async fn claim_handle(
        pool: &PgPool,
        account_id: Uuid,
        handle: &str,
    ) -> Result<AccountRow, BcError> {
        let start = Instant::now();

        let mut tx = pool.begin().await.map_err(|e| {
            metrics::record_db_query("claim_handle", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        let locked = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = $1 FOR UPDATE"
        ))
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            metrics::record_db_query("claim_handle", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        let Some(locked) = locked else {
            metrics::record_db_query("claim_handle", "success", start.elapsed());
            return Err(BcError::NotFound("Account not found".to_string()));
        };

        let account = map_row_to_account(locked);
        if account.handle.is_some() {
            // Someone set a handle between the caller's read and the lock;
            // the claimed handle wins.
            metrics::record_db_query("claim_handle", "success", start.elapsed());
            return Ok(account);
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts
            SET handle = $2, updated_at = NOW()
            WHERE account_id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account_id)
        .bind(handle)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            metrics::record_db_query("claim_handle", "error", start.elapsed());
            match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    BcError::HandleTaken(handle.to_string())
                }
                _ => BcError::Database(e.to_string()),
            }
        })?;

        tx.commit().await.map_err(|e| {
            metrics::record_db_query("claim_handle", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("claim_handle", "success", start.elapsed());
        Ok(map_row_to_account(row))
    }
}

/// Map a database row to an AccountRow struct.
pub fn map_row_to_account(row: sqlx::postgres::PgRow) -> AccountRow {
    AccountRow {
        account_id: row.get("account_id"),
        email: row.get("email"),
        handle: row.get("handle"),
        is_dj: row.get("is_dj"),
        dj_bio: row.get("dj_bio"),
        dj_photo_url: row.get("dj_photo_url"),
        payout_account_id: row.get("payout_account_id"),
    }
}

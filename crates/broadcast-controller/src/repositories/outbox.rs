//! Outbox repository.
//!
//! Fire-and-forget side effects (notification emails) are enqueued here in
//! the same flow that produced them and delivered by the dispatcher task.

use crate::errors::BcError;
use crate::models::OutboxRow;
use crate::observability::metrics;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Outbox repository for database operations.
pub struct OutboxRepository;

impl OutboxRepository {
    /// Enqueue a side effect for asynchronous delivery.
    #[instrument(skip_all, name = "bc.repo.enqueue_outbox")]
    pub async fn enqueue(
        pool: &PgPool,
        kind: &str,
        payload: &serde_json::Value,
    ) -> Result<(), BcError> {
        let start = Instant::now();

        sqlx::query("INSERT INTO outbox (kind, payload) VALUES ($1, $2)")
            .bind(kind)
            .bind(payload)
            .execute(pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("enqueue_outbox", "error", start.elapsed());
                BcError::Database(e.to_string())
            })?;

        metrics::record_db_query("enqueue_outbox", "success", start.elapsed());
        Ok(())
    }

    /// Fetch a batch of undelivered entries, oldest first.
    #[instrument(skip_all, name = "bc.repo.fetch_pending_outbox")]
    pub async fn fetch_pending(pool: &PgPool, limit: i64) -> Result<Vec<OutboxRow>, BcError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r#"
            SELECT outbox_id, kind, payload, status, attempts
            FROM outbox
            WHERE status = 'pending'
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("fetch_pending_outbox", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("fetch_pending_outbox", "success", start.elapsed());
        Ok(rows
            .into_iter()
            .map(|row| OutboxRow {
                outbox_id: row.get("outbox_id"),
                kind: row.get("kind"),
                payload: row.get("payload"),
                status: row.get("status"),
                attempts: row.get("attempts"),
            })
            .collect())
    }

    /// Mark an entry delivered.
    #[instrument(skip_all, name = "bc.repo.mark_outbox_sent")]
    pub async fn mark_sent(pool: &PgPool, outbox_id: Uuid) -> Result<(), BcError> {
        let start = Instant::now();

        sqlx::query(
            "UPDATE outbox SET status = 'sent', sent_at = NOW() WHERE outbox_id = $1",
        )
        .bind(outbox_id)
        .execute(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("mark_outbox_sent", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("mark_outbox_sent", "success", start.elapsed());
        Ok(())
    }

    /// Record a failed delivery attempt. Entries past `max_attempts` are
    /// parked as 'failed' and left for operator inspection.
    #[instrument(skip_all, name = "bc.repo.mark_outbox_failed")]
    pub async fn mark_failed(
        pool: &PgPool,
        outbox_id: Uuid,
        max_attempts: i32,
    ) -> Result<(), BcError> {
        let start = Instant::now();

        sqlx::query(
            r#"
            UPDATE outbox
            SET attempts = attempts + 1,
                status = CASE WHEN attempts + 1 >= $2 THEN 'failed' ELSE 'pending' END
            WHERE outbox_id = $1
            "#,
        )
        .bind(outbox_id)
        .bind(max_attempts)
        .execute(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("mark_outbox_failed", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("mark_outbox_failed", "success", start.elapsed());
        Ok(())
    }
}

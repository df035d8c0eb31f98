//! Egress mapping repository.
//!
//! Ephemeral correlation rows from provider egress id to slot id. Inserted
//! when a recording starts, deleted once the finishing webhook consumes
//! them; a missing row on a replayed webhook is normal.

use crate::errors::BcError;
use crate::models::EgressMappingRow;
use crate::observability::metrics;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Egress mapping repository for database operations.
pub struct EgressMappingsRepository;

impl EgressMappingsRepository {
    /// Record the egress-to-slot correlation. Idempotent on egress id.
    #[instrument(skip_all, name = "bc.repo.insert_egress_mapping")]
    pub async fn insert(pool: &PgPool, egress_id: &str, slot_id: Uuid) -> Result<(), BcError> {
        let start = Instant::now();

        sqlx::query(
            r#"
            INSERT INTO egress_mappings (egress_id, slot_id)
            VALUES ($1, $2)
            ON CONFLICT (egress_id) DO NOTHING
            "#,
        )
        .bind(egress_id)
        .bind(slot_id)
        .execute(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("insert_egress_mapping", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("insert_egress_mapping", "success", start.elapsed());
        Ok(())
    }

    /// Look up the slot a provider egress belongs to.
    #[instrument(skip_all, name = "bc.repo.find_egress_mapping")]
    pub async fn find(
        pool: &PgPool,
        egress_id: &str,
    ) -> Result<Option<EgressMappingRow>, BcError> {
        let start = Instant::now();

        let row = sqlx::query(
            "SELECT egress_id, slot_id, created_at FROM egress_mappings WHERE egress_id = $1",
        )
        .bind(egress_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("find_egress_mapping", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("find_egress_mapping", "success", start.elapsed());
        Ok(row.map(|row| EgressMappingRow {
            egress_id: row.get("egress_id"),
            slot_id: row.get("slot_id"),
            created_at: row.get("created_at"),
        }))
    }

    /// Delete a consumed mapping.
    #[instrument(skip_all, name = "bc.repo.delete_egress_mapping")]
    pub async fn delete(pool: &PgPool, egress_id: &str) -> Result<(), BcError> {
        let start = Instant::now();

        sqlx::query("DELETE FROM egress_mappings WHERE egress_id = $1")
            .bind(egress_id)
            .execute(pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("delete_egress_mapping", "error", start.elapsed());
                BcError::Database(e.to_string())
            })?;

        metrics::record_db_query("delete_egress_mapping", "success", start.elapsed());
        Ok(())
    }
}

//! Archives repository.
//!
//! Public archive entries for finished broadcasts, keyed by slug.

use crate::errors::BcError;
use crate::models::ArchiveRow;
use crate::observability::metrics;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const ARCHIVE_COLUMNS: &str = r#"
    slug, slot_id, show_name, recording_url, duration_secs, published_at
"#;

/// Archives repository for database operations.
pub struct ArchivesRepository;

impl ArchivesRepository {
    /// All slugs occupying the given base: the base itself and any
    /// `base-N` suffixed variants.
    #[instrument(skip_all, name = "bc.repo.find_slugs_for_base")]
    pub async fn find_slugs_for_base(
        pool: &PgPool,
        base: &str,
    ) -> Result<Vec<String>, BcError> {
        let start = Instant::now();

        let rows = sqlx::query(
            "SELECT slug FROM archives WHERE slug = $1 OR slug LIKE $1 || '-%'",
        )
        .bind(base)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("find_slugs_for_base", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("find_slugs_for_base", "success", start.elapsed());
        Ok(rows.into_iter().map(|row| row.get("slug")).collect())
    }

    /// Archive entry already published for a slot, if any.
    #[instrument(skip_all, name = "bc.repo.find_archive_by_slot")]
    pub async fn find_by_slot(
        pool: &PgPool,
        slot_id: Uuid,
    ) -> Result<Option<ArchiveRow>, BcError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archives WHERE slot_id = $1"
        ))
        .bind(slot_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("find_archive_by_slot", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("find_archive_by_slot", "success", start.elapsed());
        Ok(row.map(map_row_to_archive))
    }

    /// Publish an archive entry.
    #[instrument(skip_all, name = "bc.repo.insert_archive")]
    pub async fn insert(
        pool: &PgPool,
        slug: &str,
        slot_id: Uuid,
        show_name: &str,
        recording_url: &str,
        duration_secs: Option<i64>,
    ) -> Result<ArchiveRow, BcError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO archives (slug, slot_id, show_name, recording_url, duration_secs)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ARCHIVE_COLUMNS}
            "#
        ))
        .bind(slug)
        .bind(slot_id)
        .bind(show_name)
        .bind(recording_url)
        .bind(duration_secs)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("insert_archive", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("insert_archive", "success", start.elapsed());
        Ok(map_row_to_archive(row))
    }
}

fn map_row_to_archive(row: sqlx::postgres::PgRow) -> ArchiveRow {
    ArchiveRow {
        slug: row.get("slug"),
        slot_id: row.get("slot_id"),
        show_name: row.get("show_name"),
        recording_url: row.get("recording_url"),
        duration_secs: row.get("duration_secs"),
        published_at: row.get("published_at"),
    }
}

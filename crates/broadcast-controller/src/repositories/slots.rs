//! Slots repository for database operations.
//!
//! Lifecycle writes are status-conditional: every transition query carries
//! its allowed source statuses in the WHERE clause, so a stale caller
//! matches zero rows instead of clobbering a newer state.
//!
//! # Security
//!
//! - All queries use parameterized statements (SQL injection safe)
//! - Broadcast tokens are only ever compared, never logged

use crate::errors::BcError;
use crate::models::{CoDj, RecordingEntry, SlotRow, SlotStatus};
use crate::observability::metrics;
use crate::services::recording::LegacyMirror;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// All slot columns, shared by every query that returns slot rows.
const SLOT_COLUMNS: &str = r#"
    slot_id, broadcast_token, token_expires_at, start_time, end_time,
    status, show_name, dj_email, dj_user_id,
    live_dj_handle, live_dj_bio, live_dj_photo_url, room_name,
    co_djs, recordings, recording_egress_id, recording_url, recording_status,
    went_live_at, ended_at, created_at, updated_at
"#;

/// A slot moved to a terminal state by the expiry sweep.
#[derive(Debug, Clone)]
pub struct ExpiredSlot {
    pub slot_id: Uuid,
    pub recording_egress_id: Option<String>,
}

/// Slots repository for database operations.
pub struct SlotsRepository;

impl SlotsRepository {
    /// Insert a freshly booked slot.
    #[instrument(skip_all, name = "bc.repo.create_slot")]
    pub async fn create_slot(
        pool: &PgPool,
        dj_email: &str,
        show_name: &str,
        broadcast_token: &str,
        token_expires_at: DateTime<Utc>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<SlotRow, BcError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO slots (
                dj_email, show_name, broadcast_token, token_expires_at,
                start_time, end_time, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'scheduled')
            RETURNING {SLOT_COLUMNS}
            "#
        ))
        .bind(dj_email)
        .bind(show_name)
        .bind(broadcast_token)
        .bind(token_expires_at)
        .bind(start_time)
        .bind(end_time)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("create_slot", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("create_slot", "success", start.elapsed());
        map_row_to_slot(row)
    }

    /// Look up a slot by its broadcast token.
    #[instrument(skip_all, name = "bc.repo.find_slot_by_token")]
    pub async fn find_by_token(
        pool: &PgPool,
        broadcast_token: &str,
    ) -> Result<Option<SlotRow>, BcError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            "SELECT {SLOT_COLUMNS} FROM slots WHERE broadcast_token = $1"
        ))
        .bind(broadcast_token)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("find_slot_by_token", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("find_slot_by_token", "success", start.elapsed());
        row.map(map_row_to_slot).transpose()
    }

    /// Look up a slot by id.
    #[instrument(skip_all, name = "bc.repo.find_slot_by_id")]
    pub async fn find_by_id(pool: &PgPool, slot_id: Uuid) -> Result<Option<SlotRow>, BcError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            "SELECT {SLOT_COLUMNS} FROM slots WHERE slot_id = $1"
        ))
        .bind(slot_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("find_slot_by_id", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("find_slot_by_id", "success", start.elapsed());
        row.map(map_row_to_slot).transpose()
    }

    /// Count non-cancelled bookings overlapping the half-open interval
    /// [start_time, end_time).
    #[instrument(skip_all, name = "bc.repo.count_overlapping")]
    pub async fn count_overlapping(
        pool: &PgPool,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<i64, BcError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS cnt
            FROM slots
            WHERE status != 'cancelled'
              AND start_time < $2
              AND end_time > $1
            "#,
        )
        .bind(start_time)
        .bind(end_time)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("count_overlapping", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("count_overlapping", "success", start.elapsed());
        Ok(row.get("cnt"))
    }

    /// Transition a slot to `live` and snapshot the broadcaster's display
    /// identity onto the row.
    ///
    /// `went_live_at` is set only on the first go-live; a resume keeps the
    /// original timestamp. An already-linked `dj_user_id` is never
    /// overwritten; `$2` only fills an unset one.
    #[instrument(skip_all, name = "bc.repo.go_live")]
    #[expect(
        clippy::too_many_arguments,
        reason = "Represents the full go-live snapshot written in one UPDATE"
    )]
    pub async fn go_live(
        pool: &PgPool,
        slot_id: Uuid,
        dj_user_id: Option<Uuid>,
        live_dj_handle: &str,
        live_dj_bio: Option<&str>,
        live_dj_photo_url: Option<&str>,
        room_name: &str,
        now: DateTime<Utc>,
    ) -> Result<SlotRow, BcError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            r#"
            UPDATE slots
            SET status = 'live',
                dj_user_id = COALESCE(dj_user_id, $2),
                live_dj_handle = $3,
                live_dj_bio = $4,
                live_dj_photo_url = $5,
                room_name = $6,
                went_live_at = COALESCE(went_live_at, $7),
                updated_at = NOW()
            WHERE slot_id = $1
            RETURNING {SLOT_COLUMNS}
            "#
        ))
        .bind(slot_id)
        .bind(dj_user_id)
        .bind(live_dj_handle)
        .bind(live_dj_bio)
        .bind(live_dj_photo_url)
        .bind(room_name)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("go_live", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("go_live", "success", start.elapsed());
        map_row_to_slot(row)
    }

    /// Status-conditional transition. Returns the updated row, or `None`
    /// when the slot was not in one of the expected source statuses.
    #[instrument(skip_all, name = "bc.repo.set_status_if")]
    pub async fn set_status_if(
        pool: &PgPool,
        slot_id: Uuid,
        from: &[SlotStatus],
        to: SlotStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<Option<SlotRow>, BcError> {
        let start = Instant::now();
        let from: Vec<&str> = from.iter().map(SlotStatus::as_str).collect();

        let row = sqlx::query(&format!(
            r#"
            UPDATE slots
            SET status = $3,
                ended_at = COALESCE($4, ended_at),
                updated_at = NOW()
            WHERE slot_id = $1 AND status = ANY($2)
            RETURNING {SLOT_COLUMNS}
            "#
        ))
        .bind(slot_id)
        .bind(&from)
        .bind(to.as_str())
        .bind(ended_at)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("set_status_if", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("set_status_if", "success", start.elapsed());
        row.map(map_row_to_slot).transpose()
    }

    /// Move elapsed live/paused slots to `completed`.
    ///
    /// Returns the affected slots with their current recording egress id so
    /// the sweeper can stop sessions the broadcaster abandoned.
    #[instrument(skip_all, name = "bc.repo.expire_running")]
    pub async fn expire_running(
        pool: &PgPool,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredSlot>, BcError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r#"
            UPDATE slots
            SET status = 'completed', ended_at = $1, updated_at = NOW()
            WHERE status IN ('live', 'paused') AND end_time < $1
            RETURNING slot_id, recording_egress_id
            "#,
        )
        .bind(now)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("expire_running", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("expire_running", "success", start.elapsed());
        Ok(rows
            .into_iter()
            .map(|row| ExpiredSlot {
                slot_id: row.get("slot_id"),
                recording_egress_id: row.get("recording_egress_id"),
            })
            .collect())
    }

    /// Move elapsed slots that never went live to `missed`. Returns the
    /// number of slots transitioned.
    #[instrument(skip_all, name = "bc.repo.expire_scheduled")]
    pub async fn expire_scheduled(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, BcError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            UPDATE slots
            SET status = 'missed', updated_at = NOW()
            WHERE status = 'scheduled' AND end_time < $1
            "#,
        )
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("expire_scheduled", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("expire_scheduled", "success", start.elapsed());
        Ok(result.rows_affected())
    }

    /// Attach a reconciled account id to a bounded chunk of the
    /// broadcaster's unlinked, non-terminal slots.
    ///
    /// Each call is its own transaction; callers loop until a short chunk
    /// comes back so progress commits incrementally.
    #[instrument(skip_all, name = "bc.repo.attach_dj_user_chunk")]
    pub async fn attach_dj_user_chunk(
        pool: &PgPool,
        dj_email: &str,
        account_id: Uuid,
        chunk_size: i64,
    ) -> Result<u64, BcError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            UPDATE slots
            SET dj_user_id = $2, updated_at = NOW()
            WHERE slot_id IN (
                SELECT slot_id FROM slots
                WHERE dj_email = $1
                  AND dj_user_id IS NULL
                  AND status NOT IN ('completed', 'missed', 'cancelled')
                LIMIT $3
            )
            "#,
        )
        .bind(dj_email)
        .bind(account_id)
        .bind(chunk_size)
        .execute(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("attach_dj_user_chunk", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("attach_dj_user_chunk", "success", start.elapsed());
        Ok(result.rows_affected())
    }

    /// Find non-terminal slots whose denormalized co-broadcaster list has an
    /// unlinked entry for the given email.
    #[instrument(skip_all, name = "bc.repo.find_unlinked_co_dj_slots")]
    pub async fn find_unlinked_co_dj_slots(
        pool: &PgPool,
        email: &str,
        limit: i64,
    ) -> Result<Vec<(Uuid, Vec<CoDj>)>, BcError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r#"
            SELECT slot_id, co_djs
            FROM slots
            WHERE status NOT IN ('completed', 'missed', 'cancelled')
              AND EXISTS (
                  SELECT 1 FROM jsonb_array_elements(co_djs) AS entry
                  WHERE entry->>'email' = $1 AND entry->>'user_id' IS NULL
              )
            LIMIT $2
            "#,
        )
        .bind(email)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("find_unlinked_co_dj_slots", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("find_unlinked_co_dj_slots", "success", start.elapsed());

        rows.into_iter()
            .map(|row| {
                let slot_id: Uuid = row.get("slot_id");
                let co_djs = decode_co_djs(row.get("co_djs"))?;
                Ok((slot_id, co_djs))
            })
            .collect()
    }

    /// Replace a slot's co-broadcaster list.
    #[instrument(skip_all, name = "bc.repo.update_co_djs")]
    pub async fn update_co_djs(
        pool: &PgPool,
        slot_id: Uuid,
        co_djs: &[CoDj],
    ) -> Result<(), BcError> {
        let start = Instant::now();
        let value = serde_json::to_value(co_djs).map_err(|_| BcError::Internal)?;

        sqlx::query(
            "UPDATE slots SET co_djs = $2, updated_at = NOW() WHERE slot_id = $1",
        )
        .bind(slot_id)
        .bind(value)
        .execute(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("update_co_djs", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("update_co_djs", "success", start.elapsed());
        Ok(())
    }

    /// Append a new active recording entry and point the legacy mirror at
    /// it. Called when a go-live starts a fresh recording.
    #[instrument(skip_all, name = "bc.repo.start_recording")]
    pub async fn start_recording(
        pool: &PgPool,
        slot_id: Uuid,
        entry: &RecordingEntry,
    ) -> Result<(), BcError> {
        let start = Instant::now();
        let value = serde_json::to_value(entry).map_err(|_| BcError::Internal)?;

        sqlx::query(
            r#"
            UPDATE slots
            SET recordings = recordings || jsonb_build_array($2::jsonb),
                recording_egress_id = $3,
                recording_url = NULL,
                recording_status = 'active',
                updated_at = NOW()
            WHERE slot_id = $1
            "#,
        )
        .bind(slot_id)
        .bind(value)
        .bind(&entry.egress_id)
        .execute(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("start_recording", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("start_recording", "success", start.elapsed());
        Ok(())
    }

    /// Write back the canonical recordings array and, when the affected
    /// entry is the current one, its derived legacy mirror.
    #[instrument(skip_all, name = "bc.repo.update_recordings")]
    pub async fn update_recordings(
        pool: &PgPool,
        slot_id: Uuid,
        recordings: &[RecordingEntry],
        mirror: Option<&LegacyMirror>,
    ) -> Result<(), BcError> {
        let start = Instant::now();
        let value = serde_json::to_value(recordings).map_err(|_| BcError::Internal)?;

        let result = match mirror {
            Some(mirror) => {
                sqlx::query(
                    r#"
                    UPDATE slots
                    SET recordings = $2,
                        recording_url = $3,
                        recording_status = $4,
                        updated_at = NOW()
                    WHERE slot_id = $1
                    "#,
                )
                .bind(slot_id)
                .bind(value)
                .bind(&mirror.url)
                .bind(&mirror.status)
                .execute(pool)
                .await
            }
            None => {
                sqlx::query(
                    "UPDATE slots SET recordings = $2, updated_at = NOW() WHERE slot_id = $1",
                )
                .bind(slot_id)
                .bind(value)
                .execute(pool)
                .await
            }
        };

        result.map_err(|e| {
            metrics::record_db_query("update_recordings", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("update_recordings", "success", start.elapsed());
        Ok(())
    }

    /// Fallback lookup by the legacy single-recording column, for slots
    /// that predate egress mappings.
    #[instrument(skip_all, name = "bc.repo.find_by_legacy_egress")]
    pub async fn find_by_legacy_egress(
        pool: &PgPool,
        egress_id: &str,
    ) -> Result<Option<SlotRow>, BcError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            "SELECT {SLOT_COLUMNS} FROM slots WHERE recording_egress_id = $1"
        ))
        .bind(egress_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("find_by_legacy_egress", "error", start.elapsed());
            BcError::Database(e.to_string())
        })?;

        metrics::record_db_query("find_by_legacy_egress", "success", start.elapsed());
        row.map(map_row_to_slot).transpose()
    }
}

/// Map a database row to a SlotRow struct.
///
/// Shared by all queries that return slot rows. Fails on status strings or
/// JSONB payloads the application does not recognize.
pub fn map_row_to_slot(row: sqlx::postgres::PgRow) -> Result<SlotRow, BcError> {
    let status_str: String = row.get("status");
    let status = SlotStatus::parse(&status_str)
        .ok_or_else(|| BcError::Database(format!("unknown slot status '{status_str}'")))?;

    let co_djs = decode_co_djs(row.get("co_djs"))?;
    let recordings: Vec<RecordingEntry> = serde_json::from_value(row.get("recordings"))
        .map_err(|e| BcError::Database(format!("malformed recordings array: {e}")))?;

    Ok(SlotRow {
        slot_id: row.get("slot_id"),
        broadcast_token: row.get("broadcast_token"),
        token_expires_at: row.get("token_expires_at"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        status,
        show_name: row.get("show_name"),
        dj_email: row.get("dj_email"),
        dj_user_id: row.get("dj_user_id"),
        live_dj_handle: row.get("live_dj_handle"),
        live_dj_bio: row.get("live_dj_bio"),
        live_dj_photo_url: row.get("live_dj_photo_url"),
        room_name: row.get("room_name"),
        co_djs,
        recordings,
        recording_egress_id: row.get("recording_egress_id"),
        recording_url: row.get("recording_url"),
        recording_status: row.get("recording_status"),
        went_live_at: row.get("went_live_at"),
        ended_at: row.get("ended_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn decode_co_djs(value: serde_json::Value) -> Result<Vec<CoDj>, BcError> {
    serde_json::from_value(value)
        .map_err(|e| BcError::Database(format!("malformed co_djs array: {e}")))
}

//! Media session orchestration.
//!
//! Wires the streaming provider to slot state: starting a provider session
//! on go-live (room, recording, egress mapping) and stopping the egress on
//! pause/complete signals. Slot status decisions live in
//! `services::session`; this module only moves media state.

use crate::errors::BcError;
use crate::models::{RecordingEntry, RecordingStatus, SlotRow};
use crate::repositories::{EgressMappingsRepository, SlotsRepository};
use crate::services::streaming_client::{SessionInfo, StartSessionRequest, StreamingClient};
use chrono::Utc;
use sqlx::PgPool;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Room name for a slot's broadcasts. Stable across resumes so a paused
/// broadcaster rejoins the same room.
pub fn room_name_for(slot_id: Uuid) -> String {
    format!("slot-{}", slot_id.simple())
}

/// Media session orchestration service.
pub struct MediaSessionService;

impl MediaSessionService {
    /// Start a provider session with recording for a slot.
    ///
    /// Persists the egress-to-slot mapping and appends an active entry to
    /// the slot's recordings array before returning, so a webhook arriving
    /// immediately after provider start can already resolve the slot.
    #[instrument(skip_all, name = "bc.media.start_session", fields(slot_id = %slot.slot_id))]
    pub async fn start_for_slot(
        pool: &PgPool,
        streaming: &dyn StreamingClient,
        slot: &SlotRow,
        room_name: &str,
    ) -> Result<SessionInfo, BcError> {
        let info = streaming
            .start_session(&StartSessionRequest {
                room_name: room_name.to_string(),
                record: true,
            })
            .await?;

        EgressMappingsRepository::insert(pool, &info.egress_id, slot.slot_id).await?;

        let entry = RecordingEntry {
            egress_id: info.egress_id.clone(),
            url: None,
            status: RecordingStatus::Active,
            duration_secs: None,
            started_at: Utc::now(),
        };
        SlotsRepository::start_recording(pool, slot.slot_id, &entry).await?;

        Ok(info)
    }

    /// Stop the current egress for a slot, best effort.
    ///
    /// Pause and complete must succeed even when the provider is down; the
    /// expiry sweeper retries the stop and the provider times abandoned
    /// egresses out on its own.
    #[instrument(skip_all, name = "bc.media.stop_session")]
    pub async fn stop_best_effort(streaming: &dyn StreamingClient, egress_id: Option<&str>) {
        let Some(egress_id) = egress_id else {
            return;
        };

        if let Err(e) = streaming.stop_session(egress_id).await {
            warn!(
                target: "bc.services.media_session",
                egress_id = %egress_id,
                error = %e,
                "Failed to stop egress; provider will time it out"
            );
        }
    }
}

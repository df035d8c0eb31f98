//! Broadcast Controller models.
//!
//! Row types mirror the database schema; request/response types are the
//! HTTP API surface. Status enums carry the legal lifecycle values and the
//! string forms stored in Postgres.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel value for a tip whose broadcaster identity has not yet been
/// resolved to a real account.
pub const PENDING_DJ_USER_ID: &str = "pending";

/// Tip capture result that makes a tip payable.
pub const TIP_STATUS_SUCCEEDED: &str = "succeeded";

/// Maximum broadcaster handle length.
pub const MAX_HANDLE_LENGTH: usize = 30;

/// Minimum broadcaster handle length.
pub const MIN_HANDLE_LENGTH: usize = 2;

/// Maximum show name length.
pub const MAX_SHOW_NAME_LENGTH: usize = 120;

/// Slot lifecycle status.
///
/// Transitions are enforced by `services::session` guards and by
/// status-conditional repository updates, never by blind writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// Booked but never gone live.
    Scheduled,

    /// Actively broadcasting.
    Live,

    /// Broadcaster disconnected without an explicit stop.
    Paused,

    /// Broadcast ended (explicitly or by the expiry sweeper).
    Completed,

    /// Window elapsed without the slot ever going live.
    Missed,

    /// Booking was cancelled before the window.
    Cancelled,
}

impl SlotStatus {
    /// String form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Scheduled => "scheduled",
            SlotStatus::Live => "live",
            SlotStatus::Paused => "paused",
            SlotStatus::Completed => "completed",
            SlotStatus::Missed => "missed",
            SlotStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the database string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(SlotStatus::Scheduled),
            "live" => Some(SlotStatus::Live),
            "paused" => Some(SlotStatus::Paused),
            "completed" => Some(SlotStatus::Completed),
            "missed" => Some(SlotStatus::Missed),
            "cancelled" => Some(SlotStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states are skipped by identity reconciliation.
    ///
    /// A terminal slot can still re-enter `live` through go-live while its
    /// window has time remaining; terminality here only bounds which rows
    /// reconciliation back-fills.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SlotStatus::Completed | SlotStatus::Missed | SlotStatus::Cancelled
        )
    }
}

/// Tip payout lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Payable once identity and destination checks pass.
    Pending,

    /// Funds transferred to the broadcaster. Never re-transferred.
    Transferred,

    /// Reallocated to the community pool (unclaimed after the cutoff).
    ReallocatedToPool,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Transferred => "transferred",
            PayoutStatus::ReallocatedToPool => "reallocated_to_pool",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PayoutStatus::Pending),
            "transferred" => Some(PayoutStatus::Transferred),
            "reallocated_to_pool" => Some(PayoutStatus::ReallocatedToPool),
            _ => None,
        }
    }
}

/// State of a single recording inside a slot's `recordings` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    /// Recording in progress.
    Active,

    /// Recording finished and the media location is known.
    Complete,

    /// Provider reported a failure.
    Failed,
}

impl RecordingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingStatus::Active => "active",
            RecordingStatus::Complete => "complete",
            RecordingStatus::Failed => "failed",
        }
    }
}

/// One entry in a slot's canonical `recordings` array.
///
/// The legacy single-recording columns on the slot are a derived mirror of
/// the entry whose `egress_id` matches `recording_egress_id`; they are
/// recomputed on every write and never updated independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingEntry {
    /// External session identifier from the streaming provider.
    pub egress_id: String,

    /// Media location, known once the recording finishes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub status: RecordingStatus,

    /// Duration in whole seconds, known once the recording finishes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,

    pub started_at: DateTime<Utc>,
}

/// Denormalized co-broadcaster entry on a slot.
///
/// Reconciliation matches these by email, not by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoDj {
    pub email: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

/// Slot database row.
#[derive(Debug, Clone)]
pub struct SlotRow {
    pub slot_id: Uuid,

    /// Capability credential presented by the broadcaster client.
    pub broadcast_token: String,

    pub token_expires_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
    pub show_name: String,

    /// Stable identity key, set at booking time.
    pub dj_email: String,

    /// Durable account identity, null until reconciled or set at go-live.
    pub dj_user_id: Option<Uuid>,

    /// Display identity snapshot, copied in at go-live time so later profile
    /// edits do not retroactively alter a past broadcast.
    pub live_dj_handle: Option<String>,
    pub live_dj_bio: Option<String>,
    pub live_dj_photo_url: Option<String>,

    /// Streaming provider room, set once the first go-live starts a session.
    pub room_name: Option<String>,

    pub co_djs: Vec<CoDj>,

    /// Canonical recording state.
    pub recordings: Vec<RecordingEntry>,

    /// Legacy single-recording mirror (derived, see `RecordingEntry`).
    pub recording_egress_id: Option<String>,
    pub recording_url: Option<String>,
    pub recording_status: Option<String>,

    pub went_live_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tip database row.
#[derive(Debug, Clone)]
pub struct TipRow {
    pub tip_id: Uuid,
    pub dj_email: String,

    /// `"pending"` sentinel until reconciled, then the account UUID as text.
    pub dj_user_id: String,

    pub amount_cents: i64,

    /// Payment-capture result (`succeeded` is the payable one).
    pub status: String,

    pub payout_status: PayoutStatus,
    pub transfer_id: Option<String>,
    pub transferred_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TipRow {
    /// Whether the sweeper may attempt a transfer for this tip, before the
    /// per-broadcaster destination check.
    pub fn is_transfer_candidate(&self) -> bool {
        self.status == TIP_STATUS_SUCCEEDED
            && self.payout_status == PayoutStatus::Pending
            && self.dj_user_id != PENDING_DJ_USER_ID
    }
}

/// Account database row.
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub account_id: Uuid,
    pub email: String,

    /// Claimed display handle. Once set it always wins over client input.
    pub handle: Option<String>,

    pub is_dj: bool,
    pub dj_bio: Option<String>,
    pub dj_photo_url: Option<String>,

    /// Payment-processor destination id, null until onboarding completes.
    pub payout_account_id: Option<String>,
}

/// Ephemeral egress-to-slot correlation row.
///
/// Created when a recording starts, deleted when the webhook consumes it.
/// Its absence after completion is normal, not an error.
#[derive(Debug, Clone)]
pub struct EgressMappingRow {
    pub egress_id: String,
    pub slot_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Archival record of a finished broadcast.
#[derive(Debug, Clone)]
pub struct ArchiveRow {
    pub slug: String,
    pub slot_id: Uuid,
    pub show_name: String,
    pub recording_url: String,
    pub duration_secs: Option<i64>,
    pub published_at: DateTime<Utc>,
}

/// Outbox row for dispatched side effects.
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub outbox_id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
}

// ============================================================================
// HTTP API Models
// ============================================================================

/// Request to book a slot.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookSlotRequest {
    pub dj_email: String,
    pub show_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl BookSlotRequest {
    /// Validate shape-level constraints. Availability and lead-time rules
    /// are checked separately against existing bookings.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.dj_email.trim().is_empty() || !self.dj_email.contains('@') {
            return Err("A valid broadcaster email is required");
        }

        let show_name = self.show_name.trim();
        if show_name.is_empty() {
            return Err("Show name must not be empty");
        }
        if show_name.len() > MAX_SHOW_NAME_LENGTH {
            return Err("Show name is too long");
        }

        if self.end_time <= self.start_time {
            return Err("End time must be after start time");
        }

        Ok(())
    }
}

/// Response for a booked slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSlotResponse {
    pub slot_id: Uuid,
    pub broadcast_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
}

impl From<SlotRow> for BookSlotResponse {
    fn from(row: SlotRow) -> Self {
        Self {
            slot_id: row.slot_id,
            broadcast_token: row.broadcast_token,
            token_expires_at: row.token_expires_at,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status,
        }
    }
}

/// Public slot view. Never exposes the broadcast token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotResponse {
    pub slot_id: Uuid,
    pub status: SlotStatus,
    pub show_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_dj_handle: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub went_live_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    pub recordings: Vec<RecordingEntry>,
}

impl From<SlotRow> for SlotResponse {
    fn from(row: SlotRow) -> Self {
        Self {
            slot_id: row.slot_id,
            status: row.status,
            show_name: row.show_name,
            start_time: row.start_time,
            end_time: row.end_time,
            live_dj_handle: row.live_dj_handle,
            went_live_at: row.went_live_at,
            ended_at: row.ended_at,
            recordings: row.recordings,
        }
    }
}

/// Request to go live on a slot.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoLiveRequest {
    pub broadcast_token: String,

    /// Signed-in caller's account. When present, the account's claimed
    /// handle always wins over `handle`.
    #[serde(default)]
    pub account_id: Option<Uuid>,

    /// Handle the client wants to broadcast under. Ignored for accounts
    /// that already claimed one; claimed atomically otherwise.
    #[serde(default)]
    pub handle: Option<String>,
}

impl GoLiveRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.broadcast_token.trim().is_empty() {
            return Err("Broadcast token is required");
        }

        if let Some(handle) = &self.handle {
            validate_handle(handle)?;
        }

        Ok(())
    }
}

/// Validate a broadcaster handle.
pub fn validate_handle(handle: &str) -> Result<(), &'static str> {
    let handle = handle.trim();

    if handle.len() < MIN_HANDLE_LENGTH {
        return Err("Handle is too short");
    }
    if handle.len() > MAX_HANDLE_LENGTH {
        return Err("Handle is too long");
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("Handle may only contain letters, digits, '_' and '-'");
    }

    Ok(())
}

/// Response for a successful go-live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoLiveResponse {
    pub slot_id: Uuid,
    pub status: SlotStatus,

    /// Display handle resolved for this broadcast.
    pub handle: String,

    /// Streaming provider playback/ingest URL.
    pub stream_url: String,

    /// Recording session identifier, when recording started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub egress_id: Option<String>,
}

/// Request body shared by pause and complete signals.
///
/// Both the explicit API call and the page-unload beacon send this; the
/// handlers are idempotent so the two may race safely.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSignalRequest {
    pub broadcast_token: String,
}

/// Response for pause/complete signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStateResponse {
    pub slot_id: Uuid,
    pub status: SlotStatus,
}

/// Inbound "recording finished" webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingWebhookEvent {
    /// External session identifier.
    pub egress_id: String,

    /// Provider event type (`egress_ended`, `egress_failed`, ...).
    pub event_type: String,

    /// Final media location, present on successful completion.
    #[serde(default)]
    pub media_location: Option<String>,

    /// Recording duration in nanoseconds, as delivered by the provider.
    #[serde(default)]
    pub duration_ns: Option<i64>,
}

/// Summary of one identity reconciliation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileSummary {
    /// Slots whose top-level `dj_user_id` was attached.
    pub slots_linked: u64,

    /// Slots whose denormalized co-broadcaster list gained a user id.
    pub co_dj_links: u64,

    /// Tips flipped from the pending sentinel to a real identity.
    pub tips_resolved: u64,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status ("healthy" or "unhealthy").
    pub status: String,

    /// Deployment region.
    pub region: String,

    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

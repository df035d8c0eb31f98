//! Broadcast session handlers.
//!
//! - `POST /v1/sessions/go-live` - Start or resume broadcasting
//! - `POST /v1/sessions/pause` - Pause signal (explicit or page-unload beacon)
//! - `POST /v1/sessions/complete` - End the broadcast
//!
//! # Security
//!
//! - All three endpoints authenticate by broadcast token, never by slot id
//! - Pause and complete are idempotent; racing duplicates converge
//! - Error messages are generic to prevent token probing

use crate::errors::BcError;
use crate::models::{
    validate_handle, GoLiveRequest, GoLiveResponse, SessionSignalRequest, SessionStateResponse,
    SlotRow, SlotStatus,
};
use crate::observability::metrics;
use crate::repositories::{AccountsRepository, SlotsRepository};
use crate::routes::AppState;
use crate::services::media_session::{room_name_for, MediaSessionService};
use crate::services::session::{self, HandleResolution};
use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Handler for POST /v1/sessions/go-live
///
/// Transition a slot to `live`: resolve the broadcaster's display identity,
/// start a provider media session with recording, and snapshot the identity
/// onto the slot.
///
/// # Response
///
/// - 200 OK: now live, stream URL in the body
/// - 400 Bad Request: invalid body or missing handle
/// - 401 Unauthorized: unknown or expired broadcast token
/// - 409 Conflict: requested handle already claimed
/// - 410 Gone: the slot's window has elapsed
/// - 503 Service Unavailable: streaming provider down
#[instrument(
    skip_all,
    name = "bc.sessions.go_live",
    fields(method = "POST", endpoint = "/v1/sessions/go-live")
)]
pub async fn go_live(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<GoLiveResponse>, BcError> {
    let start = Instant::now();

    let request: GoLiveRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(target: "bc.handlers.sessions", error = %e, "Invalid request body");
        metrics::record_go_live("error", Some("bad_request"), start.elapsed());
        BcError::BadRequest("Invalid request body".to_string())
    })?;

    request.validate().map_err(|e| {
        metrics::record_go_live("error", Some("bad_request"), start.elapsed());
        BcError::BadRequest(e.to_string())
    })?;

    let slot = SlotsRepository::find_by_token(&state.pool, request.broadcast_token.trim())
        .await?
        .ok_or_else(|| {
            metrics::record_go_live("error", Some("invalid_token"), start.elapsed());
            BcError::InvalidToken("Invalid broadcast token".to_string())
        })?;

    let now = Utc::now();
    session::check_go_live(&slot, now).inspect_err(|e| {
        let reason = match e {
            BcError::SlotEnded => "slot_ended",
            BcError::InvalidToken(_) => "token_expired",
            _ => "rejected",
        };
        metrics::record_go_live("error", Some(reason), start.elapsed());
    })?;

    // Resolve the display identity before touching any state.
    let account = match request.account_id {
        Some(account_id) => Some(
            AccountsRepository::find_by_id(&state.pool, account_id)
                .await?
                .ok_or_else(|| {
                    metrics::record_go_live("error", Some("unknown_account"), start.elapsed());
                    BcError::BadRequest("Unknown account".to_string())
                })?,
        ),
        None => None,
    };

    let resolution = session::resolve_handle(
        account.is_some(),
        account.as_ref().and_then(|a| a.handle.as_deref()),
        request.handle.as_deref(),
    )
    .inspect_err(|_| {
        metrics::record_go_live("error", Some("bad_request"), start.elapsed());
    })?;

    let (handle, account) = match resolution {
        HandleResolution::UseClaimed(handle) => (handle, account),
        HandleResolution::Claim(handle) => {
            validate_handle(&handle).map_err(|e| {
                metrics::record_go_live("error", Some("bad_request"), start.elapsed());
                BcError::BadRequest(e.to_string())
            })?;

            let account_id = request.account_id.ok_or(BcError::Internal)?;
            let claimed = AccountsRepository::claim_handle(&state.pool, account_id, &handle)
                .await
                .inspect_err(|e| {
                    let reason = match e {
                        BcError::HandleTaken(_) => "handle_taken",
                        _ => "db_error",
                    };
                    metrics::record_go_live("error", Some(reason), start.elapsed());
                })?;

            // The transaction may report a concurrently claimed handle.
            let handle = claimed.handle.clone().ok_or(BcError::Internal)?;
            (handle, Some(claimed))
        }
        HandleResolution::Ephemeral(handle) => {
            validate_handle(&handle).map_err(|e| {
                metrics::record_go_live("error", Some("bad_request"), start.elapsed());
                BcError::BadRequest(e.to_string())
            })?;
            (handle, None)
        }
    };

    // Same room across resumes, fresh recording per go-live.
    let room_name = slot
        .room_name
        .clone()
        .unwrap_or_else(|| room_name_for(slot.slot_id));

    let info =
        MediaSessionService::start_for_slot(&state.pool, state.streaming.as_ref(), &slot, &room_name)
            .await
            .inspect_err(|_| {
                metrics::record_go_live("error", Some("provider_unavailable"), start.elapsed());
            })?;

    let updated = SlotsRepository::go_live(
        &state.pool,
        slot.slot_id,
        account.as_ref().map(|a| a.account_id),
        &handle,
        account.as_ref().and_then(|a| a.dj_bio.as_deref()),
        account.as_ref().and_then(|a| a.dj_photo_url.as_deref()),
        &room_name,
        now,
    )
    .await
    .inspect_err(|_| {
        metrics::record_go_live("error", Some("db_error"), start.elapsed());
    })?;

    metrics::record_go_live("success", None, start.elapsed());
    info!(
        target: "bc.handlers.sessions",
        slot_id = %updated.slot_id,
        previous_status = slot.status.as_str(),
        "Broadcast is live"
    );

    Ok(Json(GoLiveResponse {
        slot_id: updated.slot_id,
        status: updated.status,
        handle,
        stream_url: info.stream_url,
        egress_id: Some(info.egress_id),
    }))
}

/// Handler for POST /v1/sessions/pause
///
/// Pause a live broadcast. Signals for slots that are not live are safe
/// no-ops returning the current state, so the explicit call and the
/// page-unload beacon may race.
#[instrument(
    skip_all,
    name = "bc.sessions.pause",
    fields(method = "POST", endpoint = "/v1/sessions/pause")
)]
pub async fn pause(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<SessionStateResponse>, BcError> {
    let slot = resolve_signal_slot(&state, &body).await.inspect_err(|_| {
        metrics::record_session_signal("pause", "rejected");
    })?;

    let Some(target) = session::apply_pause(slot.status) else {
        metrics::record_session_signal("pause", "noop");
        return Ok(Json(SessionStateResponse {
            slot_id: slot.slot_id,
            status: slot.status,
        }));
    };

    let updated =
        SlotsRepository::set_status_if(&state.pool, slot.slot_id, &[SlotStatus::Live], target, None)
            .await?;

    // The recording keeps running while paused; only the room presence
    // changes, which the provider tracks on its own.
    match updated {
        Some(updated) => {
            metrics::record_session_signal("pause", "applied");
            Ok(Json(SessionStateResponse {
                slot_id: updated.slot_id,
                status: updated.status,
            }))
        }
        None => {
            // Lost the race to another signal; report the current state.
            metrics::record_session_signal("pause", "noop");
            let current = SlotsRepository::find_by_id(&state.pool, slot.slot_id)
                .await?
                .ok_or_else(|| BcError::NotFound("Slot not found".to_string()))?;
            Ok(Json(SessionStateResponse {
                slot_id: current.slot_id,
                status: current.status,
            }))
        }
    }
}

/// Handler for POST /v1/sessions/complete
///
/// End a broadcast from `live` or `paused`. Stops the current egress best
/// effort; the recording webhook finishes the archival flow.
#[instrument(
    skip_all,
    name = "bc.sessions.complete",
    fields(method = "POST", endpoint = "/v1/sessions/complete")
)]
pub async fn complete(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<SessionStateResponse>, BcError> {
    let slot = resolve_signal_slot(&state, &body).await.inspect_err(|_| {
        metrics::record_session_signal("complete", "rejected");
    })?;

    let Some(target) = session::apply_complete(slot.status) else {
        metrics::record_session_signal("complete", "noop");
        return Ok(Json(SessionStateResponse {
            slot_id: slot.slot_id,
            status: slot.status,
        }));
    };

    let now = Utc::now();
    let updated = SlotsRepository::set_status_if(
        &state.pool,
        slot.slot_id,
        &[SlotStatus::Live, SlotStatus::Paused],
        target,
        Some(now),
    )
    .await?;

    match updated {
        Some(updated) => {
            MediaSessionService::stop_best_effort(
                state.streaming.as_ref(),
                updated.recording_egress_id.as_deref(),
            )
            .await;

            metrics::record_session_signal("complete", "applied");
            info!(
                target: "bc.handlers.sessions",
                slot_id = %updated.slot_id,
                "Broadcast completed"
            );
            Ok(Json(SessionStateResponse {
                slot_id: updated.slot_id,
                status: updated.status,
            }))
        }
        None => {
            metrics::record_session_signal("complete", "noop");
            let current = SlotsRepository::find_by_id(&state.pool, slot.slot_id)
                .await?
                .ok_or_else(|| BcError::NotFound("Slot not found".to_string()))?;
            Ok(Json(SessionStateResponse {
                slot_id: current.slot_id,
                status: current.status,
            }))
        }
    }
}

/// Parse a signal body and resolve its slot by broadcast token.
async fn resolve_signal_slot(state: &AppState, body: &[u8]) -> Result<SlotRow, BcError> {
    let request: SessionSignalRequest = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "bc.handlers.sessions", error = %e, "Invalid request body");
        BcError::BadRequest("Invalid request body".to_string())
    })?;

    SlotsRepository::find_by_token(&state.pool, request.broadcast_token.trim())
        .await?
        .ok_or_else(|| BcError::InvalidToken("Invalid broadcast token".to_string()))
}

//! Slot booking handlers.
//!
//! - `POST /v1/slots` - Book a broadcast slot (public)
//! - `GET /v1/slots/{id}` - Public slot view
//!
//! # Security
//!
//! - Broadcast tokens are generated with a CSPRNG and returned exactly once,
//!   in the booking response
//! - The public slot view never includes the token

use crate::errors::BcError;
use crate::models::{BookSlotRequest, BookSlotResponse, SlotResponse};
use crate::repositories::SlotsRepository;
use crate::routes::AppState;
use crate::services::availability;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Base62 alphabet for broadcast token generation.
const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of generated broadcast tokens.
const BROADCAST_TOKEN_LENGTH: usize = 32;

/// Maximum collision retries for broadcast token generation.
const MAX_TOKEN_COLLISION_RETRIES: usize = 3;

/// Handler for POST /v1/slots
///
/// Book a broadcast slot. The requested interval must be non-empty, outside
/// the lead-time exclusion window, inside one calendar day, and free of
/// overlap with existing non-cancelled bookings.
///
/// # Response
///
/// - 201 Created: slot booked, broadcast token in the body
/// - 400 Bad Request: invalid body or unavailable interval
/// - 500 Internal Server Error: database error or token collision
#[instrument(
    skip_all,
    name = "bc.slots.book",
    fields(method = "POST", endpoint = "/v1/slots")
)]
pub async fn book_slot(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<BookSlotResponse>), BcError> {
    // Deserialize manually to return 400 (not Axum's default 422)
    let request: BookSlotRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(target: "bc.handlers.slots", error = %e, "Invalid request body");
        BcError::BadRequest("Invalid request body".to_string())
    })?;

    request
        .validate()
        .map_err(|e| BcError::BadRequest(e.to_string()))?;

    let now = Utc::now();
    availability::validate_window(
        request.start_time,
        request.end_time,
        now,
        state.config.booking_lead_time_hours,
    )
    .map_err(|denial| BcError::BadRequest(denial.message().to_string()))?;

    let overlapping =
        SlotsRepository::count_overlapping(&state.pool, request.start_time, request.end_time)
            .await?;
    if overlapping > 0 {
        return Err(BcError::BadRequest(
            "The requested time is already booked".to_string(),
        ));
    }

    let token_expires_at = request.end_time + Duration::hours(state.config.token_grace_hours);
    let dj_email = request.dj_email.trim().to_lowercase();
    let show_name = request.show_name.trim().to_string();

    // Token collision is astronomically unlikely at 190 bits; retry anyway
    // since the column is unique.
    for attempt in 0..MAX_TOKEN_COLLISION_RETRIES {
        let broadcast_token = generate_broadcast_token()?;

        match SlotsRepository::create_slot(
            &state.pool,
            &dj_email,
            &show_name,
            &broadcast_token,
            token_expires_at,
            request.start_time,
            request.end_time,
        )
        .await
        {
            Ok(row) => {
                info!(
                    target: "bc.handlers.slots",
                    slot_id = %row.slot_id,
                    start_time = %row.start_time,
                    "Slot booked"
                );
                return Ok((StatusCode::CREATED, Json(BookSlotResponse::from(row))));
            }
            Err(BcError::Database(ref e))
                if e.contains("unique constraint") || e.contains("duplicate key") =>
            {
                tracing::debug!(
                    target: "bc.handlers.slots",
                    attempt = attempt + 1,
                    "Broadcast token collision, retrying"
                );
            }
            Err(e) => return Err(e),
        }
    }

    Err(BcError::Internal)
}

/// Handler for GET /v1/slots/{id}
///
/// Public slot view without the broadcast token.
#[instrument(
    skip_all,
    name = "bc.slots.get",
    fields(method = "GET", endpoint = "/v1/slots/{id}")
)]
pub async fn get_slot(
    State(state): State<Arc<AppState>>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<SlotResponse>, BcError> {
    let slot = SlotsRepository::find_by_id(&state.pool, slot_id)
        .await?
        .ok_or_else(|| BcError::NotFound("Slot not found".to_string()))?;

    Ok(Json(SlotResponse::from(slot)))
}

/// Generate a cryptographically secure broadcast token.
///
/// 32 base62 characters (~190 bits entropy) from a CSPRNG.
fn generate_broadcast_token() -> Result<String, BcError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; BROADCAST_TOKEN_LENGTH];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!(target: "bc.handlers.slots", error = %e, "Failed to generate random bytes for broadcast token");
        BcError::Internal
    })?;

    let mut token = Vec::with_capacity(BROADCAST_TOKEN_LENGTH);
    for b in bytes {
        let idx = (b % 62) as usize;
        let ch = BASE62_CHARS.get(idx).ok_or(BcError::Internal)?;
        token.push(*ch);
    }

    String::from_utf8(token).map_err(|_| BcError::Internal)
}

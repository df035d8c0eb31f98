//! Recording webhook handler.
//!
//! `POST /v1/webhooks/recording` receives provider egress events. Only a
//! bad signature or an unparseable body gets a non-2xx response; once an
//! event is verified it is acknowledged no matter what happens inside,
//! including internal failures, so delivery retries stay on the provider's
//! backoff schedule.
//!
//! # Security
//!
//! - HMAC-SHA256 signature over the raw body, verified before parsing
//! - Signature comparison is constant time (`ring::hmac::verify`)

use crate::errors::BcError;
use crate::models::{RecordingStatus, RecordingWebhookEvent, SlotRow};
use crate::observability::metrics;
use crate::repositories::{
    ArchivesRepository, EgressMappingsRepository, OutboxRepository, SlotsRepository,
};
use crate::routes::AppState;
use crate::services::recording::{
    self, apply_recording_update, legacy_mirror, RecordingUpdate,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Outbox kind for the "your show is archived" notification.
const OUTBOX_KIND_SHOW_ARCHIVED: &str = "show_archived_email";

/// Handler for POST /v1/webhooks/recording
///
/// Once the signature verifies and the body parses, the event is always
/// acknowledged: an internal failure is logged and answered 200 so the
/// provider redelivers on its own schedule instead of hammering a fault.
///
/// # Response
///
/// - 200 OK: event processed, duplicate, unmatched, non-terminal, or
///   failed internally after verification
/// - 400 Bad Request: signed but malformed body
/// - 401 Unauthorized: missing or invalid signature
#[instrument(
    skip_all,
    name = "bc.webhooks.recording",
    fields(method = "POST", endpoint = "/v1/webhooks/recording")
)]
pub async fn recording_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), BcError> {
    let start = Instant::now();

    let signature = headers
        .get(recording::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            metrics::record_recording_webhook("rejected", "none", start.elapsed());
            BcError::InvalidSignature
        })?;

    if !recording::verify_webhook_signature(&state.config.webhook_signing_secret, &body, signature)
    {
        metrics::record_recording_webhook("rejected", "none", start.elapsed());
        return Err(BcError::InvalidSignature);
    }

    let event: RecordingWebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(target: "bc.handlers.webhooks", error = %e, "Malformed webhook body");
        metrics::record_recording_webhook("malformed", "none", start.elapsed());
        BcError::BadRequest("Malformed webhook body".to_string())
    })?;

    let Some(status) = recording::classify_event(&event.event_type) else {
        metrics::record_recording_webhook("ignored", "none", start.elapsed());
        return Ok((StatusCode::OK, Json(json!({"status": "ignored"}))));
    };

    // Past this point every outcome is a 200: a failure leaves its state
    // (including the egress mapping) in place for the provider's redelivery.
    let (outcome, resolution) = match process_event(&state, &event, status).await {
        Ok(processed) => processed,
        Err(e) => {
            error!(
                target: "bc.handlers.webhooks",
                egress_id = %event.egress_id,
                error = %e,
                "Webhook processing failed after signature verification; acknowledging"
            );
            ("error", "none")
        }
    };

    metrics::record_recording_webhook(outcome, resolution, start.elapsed());
    Ok((StatusCode::OK, Json(json!({"status": outcome}))))
}

/// Apply a verified, well-formed terminal event to slot state.
///
/// Returns the outcome label and the slot resolution path for metrics.
async fn process_event(
    state: &AppState,
    event: &RecordingWebhookEvent,
    status: RecordingStatus,
) -> Result<(&'static str, &'static str), BcError> {
    // Resolve the slot: mapping table first, then the legacy column for
    // slots recorded before mappings existed.
    let Some((slot, resolution)) = resolve_slot(state, &event.egress_id).await? else {
        warn!(
            target: "bc.handlers.webhooks",
            egress_id = %event.egress_id,
            "Webhook egress matches no slot; discarding"
        );
        return Ok(("unmatched", "none"));
    };

    let mut recordings = slot.recordings.clone();
    apply_recording_update(
        &mut recordings,
        &event.egress_id,
        RecordingUpdate {
            url: event.media_location.clone(),
            status,
            duration_secs: recording::duration_ns_to_secs(event.duration_ns),
        },
        Utc::now(),
    );

    let mirror = legacy_mirror(&recordings, slot.recording_egress_id.as_deref());
    SlotsRepository::update_recordings(&state.pool, slot.slot_id, &recordings, mirror.as_ref())
        .await?;

    if status == RecordingStatus::Complete {
        if let Some(url) = &event.media_location {
            publish_archive(state, &slot, event, url).await?;
        } else {
            warn!(
                target: "bc.handlers.webhooks",
                slot_id = %slot.slot_id,
                egress_id = %event.egress_id,
                "Completed recording carries no media location; skipping archive"
            );
        }
    }

    // Consume the ephemeral mapping; a replayed webhook then resolves
    // through the legacy column instead.
    EgressMappingsRepository::delete(&state.pool, &event.egress_id).await?;

    info!(
        target: "bc.handlers.webhooks",
        slot_id = %slot.slot_id,
        egress_id = %event.egress_id,
        recording_status = status.as_str(),
        "Recording webhook processed"
    );

    Ok(("processed", resolution))
}

/// Resolve the slot an egress belongs to, with the resolution path used.
async fn resolve_slot(
    state: &AppState,
    egress_id: &str,
) -> Result<Option<(SlotRow, &'static str)>, BcError> {
    if let Some(mapping) = EgressMappingsRepository::find(&state.pool, egress_id).await? {
        if let Some(slot) = SlotsRepository::find_by_id(&state.pool, mapping.slot_id).await? {
            return Ok(Some((slot, "mapping")));
        }
    }

    if let Some(slot) = SlotsRepository::find_by_legacy_egress(&state.pool, egress_id).await? {
        return Ok(Some((slot, "legacy_scan")));
    }

    Ok(None)
}

/// Publish the archive entry for a completed recording and enqueue the
/// broadcaster notification.
///
/// Idempotent per slot: a replayed webhook finds the existing entry and
/// does nothing. Slug collisions across slots get an incrementing suffix.
async fn publish_archive(
    state: &AppState,
    slot: &SlotRow,
    event: &RecordingWebhookEvent,
    recording_url: &str,
) -> Result<(), BcError> {
    if let Some(existing) = ArchivesRepository::find_by_slot(&state.pool, slot.slot_id).await? {
        tracing::debug!(
            target: "bc.handlers.webhooks",
            slot_id = %slot.slot_id,
            slug = %existing.slug,
            "Slot already archived; replay"
        );
        return Ok(());
    }

    let base = recording::slugify(&slot.show_name);
    let taken = ArchivesRepository::find_slugs_for_base(&state.pool, &base).await?;
    let slug = recording::next_free_slug(&base, &taken);

    let archive = ArchivesRepository::insert(
        &state.pool,
        &slug,
        slot.slot_id,
        &slot.show_name,
        recording_url,
        recording::duration_ns_to_secs(event.duration_ns),
    )
    .await?;

    OutboxRepository::enqueue(
        &state.pool,
        OUTBOX_KIND_SHOW_ARCHIVED,
        &json!({
            "recipient": slot.dj_email,
            "show_name": slot.show_name,
            "slug": archive.slug,
            "recording_url": recording_url,
        }),
    )
    .await?;

    info!(
        target: "bc.handlers.webhooks",
        slot_id = %slot.slot_id,
        slug = %archive.slug,
        "Broadcast archived"
    );

    Ok(())
}

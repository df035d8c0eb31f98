//! Slot lifecycle rules.
//!
//! Pure decision functions for the session state machine. Handlers and
//! sweepers call these to decide a transition, then apply it through a
//! status-guarded repository update, so concurrent signals and overlapping
//! sweeps converge on the same state.

use crate::errors::BcError;
use crate::models::{SlotRow, SlotStatus};
use chrono::{DateTime, Utc};

/// Resolution of the display identity for a go-live request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleResolution {
    /// Signed-in broadcaster with a claimed handle. The claimed handle wins;
    /// any client-submitted handle is silently ignored.
    UseClaimed(String),

    /// Signed-in broadcaster without a claimed handle. The submitted handle
    /// must be claimed atomically for the account.
    Claim(String),

    /// Anonymous/guest broadcaster. The handle is used unregistered.
    Ephemeral(String),
}

/// Check whether a go-live request may proceed for this slot.
///
/// The only categorical rejection is an elapsed time window. Re-entering
/// `live` from `paused`, `completed` or even `missed` is deliberate product
/// behavior: a broadcaster may reconnect after a drop as long as time
/// remains. `cancelled` slots stay rejected because their token is revoked
/// at cancellation time.
pub fn check_go_live(slot: &SlotRow, now: DateTime<Utc>) -> Result<(), BcError> {
    if slot.status == SlotStatus::Cancelled {
        return Err(BcError::NotFound("Slot not found".to_string()));
    }

    // Window check first: an elapsed slot reports SLOT_ENDED even when the
    // token has also expired by then.
    if now > slot.end_time {
        return Err(BcError::SlotEnded);
    }

    if now >= slot.token_expires_at {
        return Err(BcError::InvalidToken(
            "Broadcast token has expired".to_string(),
        ));
    }

    Ok(())
}

/// Decide the pause transition.
///
/// Returns the target status when a write is needed, `None` when the signal
/// is a safe no-op (already paused, or the slot is not in a pausable state).
/// Both the explicit pause call and the page-unload beacon go through this,
/// so racing duplicates converge.
pub fn apply_pause(status: SlotStatus) -> Option<SlotStatus> {
    match status {
        SlotStatus::Live => Some(SlotStatus::Paused),
        _ => None,
    }
}

/// Decide the complete transition.
///
/// `live` and `paused` complete; anything else is a no-op. Completion may be
/// forced before the scheduled end time.
pub fn apply_complete(status: SlotStatus) -> Option<SlotStatus> {
    match status {
        SlotStatus::Live | SlotStatus::Paused => Some(SlotStatus::Completed),
        _ => None,
    }
}

/// Resolve which display handle a go-live uses.
///
/// A signed-in broadcaster's claimed handle always wins over client input;
/// this keeps one broadcaster from drifting between names across sessions.
///
/// # Arguments
///
/// * `signed_in` - Whether the caller supplied an account id
/// * `claimed_handle` - The account's already-claimed handle, if any
/// * `submitted_handle` - Handle the client asked for, if any
pub fn resolve_handle(
    signed_in: bool,
    claimed_handle: Option<&str>,
    submitted_handle: Option<&str>,
) -> Result<HandleResolution, BcError> {
    if signed_in {
        if let Some(claimed) = claimed_handle {
            return Ok(HandleResolution::UseClaimed(claimed.to_string()));
        }

        let submitted = submitted_handle.ok_or_else(|| {
            BcError::BadRequest("A handle is required for the first broadcast".to_string())
        })?;

        return Ok(HandleResolution::Claim(submitted.trim().to_string()));
    }

    // Anonymous broadcasters get an unregistered ephemeral handle.
    match submitted_handle {
        Some(handle) => Ok(HandleResolution::Ephemeral(handle.trim().to_string())),
        None => Err(BcError::BadRequest(
            "A handle is required for guest broadcasts".to_string(),
        )),
    }
}

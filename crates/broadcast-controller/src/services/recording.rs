//! Recording finalization logic.
//!
//! Pure pieces of the webhook path: signature verification, terminal-event
//! classification, the canonical-array update with its derived legacy
//! mirror, and the deterministic archive slug scheme.

use crate::models::{RecordingEntry, RecordingStatus};
use chrono::{DateTime, Utc};
use ring::hmac;
use secrecy::{ExposeSecret, SecretString};

/// Header carrying the hex-encoded HMAC-SHA256 signature of the raw body.
pub const SIGNATURE_HEADER: &str = "x-egress-signature";

/// Fallback slug base when a show name contains no usable characters.
const FALLBACK_SLUG: &str = "broadcast";

/// Verify the provider signature over the raw webhook body.
///
/// Constant-time comparison via `ring::hmac::verify`.
pub fn verify_webhook_signature(
    secret: &SecretString,
    body: &[u8],
    signature_hex: &str,
) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.expose_secret().as_bytes());
    hmac::verify(&key, body, &signature).is_ok()
}

/// Sign a body the way the provider does. Used by tests and by the local
/// provider shim in development.
pub fn sign_webhook_body(secret: &SecretString, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.expose_secret().as_bytes());
    hex::encode(hmac::sign(&key, body).as_ref())
}

/// Map a provider event type onto a terminal recording status.
///
/// Non-terminal events (`egress_started`, `egress_updated`, ...) return
/// `None` and are discarded by the processor.
pub fn classify_event(event_type: &str) -> Option<RecordingStatus> {
    match event_type {
        "egress_ended" => Some(RecordingStatus::Complete),
        "egress_failed" | "egress_aborted" => Some(RecordingStatus::Failed),
        _ => None,
    }
}

/// Convert a provider duration in nanoseconds to whole seconds.
pub fn duration_ns_to_secs(duration_ns: Option<i64>) -> Option<i64> {
    duration_ns.map(|ns| ns / 1_000_000_000)
}

/// Finalization data applied to one recording entry.
#[derive(Debug, Clone)]
pub struct RecordingUpdate {
    pub url: Option<String>,
    pub status: RecordingStatus,
    pub duration_secs: Option<i64>,
}

/// Apply a finalization update to the canonical recordings array.
///
/// The entry is matched by egress id, not by position. When no entry exists
/// (a slot that predates the mapping scheme) one is inserted so the array
/// stays the source of truth. Returns whether an existing entry matched.
pub fn apply_recording_update(
    recordings: &mut Vec<RecordingEntry>,
    egress_id: &str,
    update: RecordingUpdate,
    now: DateTime<Utc>,
) -> bool {
    if let Some(entry) = recordings.iter_mut().find(|r| r.egress_id == egress_id) {
        entry.url = update.url.or(entry.url.take());
        entry.status = update.status;
        if update.duration_secs.is_some() {
            entry.duration_secs = update.duration_secs;
        }
        return true;
    }

    recordings.push(RecordingEntry {
        egress_id: egress_id.to_string(),
        url: update.url,
        status: update.status,
        duration_secs: update.duration_secs,
        started_at: now,
    });
    false
}

/// Derived legacy single-recording mirror.
///
/// The legacy columns are a projection of the array entry whose egress id is
/// the slot's current legacy id. Recomputed on every write; the two
/// representations are never allowed to disagree for the current recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMirror {
    pub url: Option<String>,
    pub status: String,
}

/// Recompute the legacy mirror for the current legacy egress id.
///
/// `None` when the slot has no current legacy id or the array has no entry
/// for it (the legacy columns are then left untouched).
pub fn legacy_mirror(
    recordings: &[RecordingEntry],
    current_egress_id: Option<&str>,
) -> Option<LegacyMirror> {
    let current = current_egress_id?;
    let entry = recordings.iter().find(|r| r.egress_id == current)?;

    Some(LegacyMirror {
        url: entry.url.clone(),
        status: entry.status.as_str().to_string(),
    })
}

/// Build the base archive slug from a show name.
///
/// Lowercase ASCII alphanumerics, runs of other characters collapse to a
/// single '-'.
pub fn slugify(show_name: &str) -> String {
    let mut slug = String::with_capacity(show_name.len());
    let mut last_dash = true; // suppress a leading dash

    for c in show_name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Pick the first unused slug: the base itself, then `base-2`, `base-3`, ...
pub fn next_free_slug(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|t| t == base) {
        return base.to_string();
    }

    let mut n: u32 = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.iter().any(|t| t == &candidate) {
            return candidate;
        }
        n += 1;
    }
}

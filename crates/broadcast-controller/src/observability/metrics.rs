//! Metrics definitions for Broadcast Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `bc_` prefix for Broadcast Controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `endpoint`: parameterized paths, unknown paths collapse to "/other"
//! - `status`/`outcome`: small fixed vocabularies
//! - `operation`: bounded by code (find_slot_by_token, mark_transferred, ...)

use metrics::{counter, histogram};
use std::time::Duration;

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `bc_http_requests_total`, `bc_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Captures ALL HTTP responses including framework-level errors like 415,
/// 400 (JSON parse), 404 and 405.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    // Normalize endpoint to prevent cardinality explosion
    let normalized_endpoint = normalize_endpoint(endpoint);

    let status = categorize_status_code(status_code);

    histogram!("bc_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("bc_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
///
/// Replaces dynamic segments (slot ids, account ids) with placeholders.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" => "/".to_string(),
        "/metrics" => "/metrics".to_string(),
        "/health" => "/health".to_string(),
        "/ready" => "/ready".to_string(),
        "/v1/slots" => "/v1/slots".to_string(),
        "/v1/sessions/go-live" => "/v1/sessions/go-live".to_string(),
        "/v1/sessions/pause" => "/v1/sessions/pause".to_string(),
        "/v1/sessions/complete" => "/v1/sessions/complete".to_string(),
        "/v1/webhooks/recording" => "/v1/webhooks/recording".to_string(),
        _ => normalize_dynamic_endpoint(path),
    }
}

/// Normalize paths with dynamic segments
fn normalize_dynamic_endpoint(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();

    // /v1/slots/{id}
    if path.starts_with("/v1/slots/") && parts.len() == 4 {
        return "/v1/slots/{id}".to_string();
    }

    // /internal/v1/accounts/{id}/reconcile
    if path.starts_with("/internal/v1/accounts/") && parts.len() == 6 {
        if let Some(action) = parts.get(5) {
            if *action == "reconcile" {
                return "/internal/v1/accounts/{id}/reconcile".to_string();
            }
        }
    }

    // Unknown paths normalized to "/other" to bound cardinality
    "/other".to_string()
}

// ============================================================================
// Session Lifecycle Metrics
// ============================================================================

/// Record a go-live attempt outcome.
///
/// Metric: `bc_go_live_total`, `bc_go_live_duration_seconds`
/// Labels: `status` (success/error), `reason` (slot_ended, token_expired,
/// handle_taken, not_found, provider, db_error, none)
pub fn record_go_live(status: &str, reason: Option<&str>, duration: Duration) {
    let reason = reason.unwrap_or("none");

    histogram!("bc_go_live_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("bc_go_live_total",
        "status" => status.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a pause/complete signal.
///
/// Metric: `bc_session_signals_total`
/// Labels: `signal` (pause/complete), `outcome` (applied/noop/error)
pub fn record_session_signal(signal: &str, outcome: &str) {
    counter!("bc_session_signals_total",
        "signal" => signal.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// Recording Webhook Metrics
// ============================================================================

/// Record a recording webhook delivery outcome.
///
/// Metric: `bc_recording_webhooks_total`, `bc_recording_webhook_duration_seconds`
/// Labels: `outcome` (processed/discarded/archive_failed/error),
/// `resolution` (mapping/legacy_scan/unresolved)
pub fn record_recording_webhook(outcome: &str, resolution: &str, duration: Duration) {
    histogram!("bc_recording_webhook_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("bc_recording_webhooks_total",
        "outcome" => outcome.to_string(),
        "resolution" => resolution.to_string()
    )
    .increment(1);
}

// ============================================================================
// Sweeper Metrics
// ============================================================================

/// Record slot transitions applied by the expiry sweeper.
///
/// Metric: `bc_expiry_sweep_transitions_total`
/// Labels: `to` (completed/missed)
pub fn record_expiry_transitions(to: &str, count: u64) {
    counter!("bc_expiry_sweep_transitions_total",
        "to" => to.to_string()
    )
    .increment(count);
}

/// Record a payout transfer attempt.
///
/// Metric: `bc_payout_transfers_total`
/// Labels: `status` (transferred/skipped/failed), `reason` (destination_disabled,
/// destination_missing, provider, db_error, none)
pub fn record_payout_transfer(status: &str, reason: Option<&str>) {
    let reason = reason.unwrap_or("none");

    counter!("bc_payout_transfers_total",
        "status" => status.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record identity reconciliation writes.
///
/// Metric: `bc_reconciliation_writes_total`
/// Labels: `entity` (slot/co_dj/tip)
pub fn record_reconciliation(entity: &str, count: u64) {
    counter!("bc_reconciliation_writes_total",
        "entity" => entity.to_string()
    )
    .increment(count);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution
///
/// Metric: `bc_db_query_duration_seconds`, `bc_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("bc_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("bc_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(201), "success");
        assert_eq!(categorize_status_code(400), "error");
        assert_eq!(categorize_status_code(404), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(500), "error");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_normalize_static_endpoints() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/ready"), "/ready");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(
            normalize_endpoint("/v1/sessions/go-live"),
            "/v1/sessions/go-live"
        );
        assert_eq!(
            normalize_endpoint("/v1/webhooks/recording"),
            "/v1/webhooks/recording"
        );
    }

    #[test]
    fn test_normalize_slot_id_endpoint() {
        assert_eq!(
            normalize_endpoint("/v1/slots/0c9adaf6-54b3-4b85-9fcb-8e1f0b8f8f00"),
            "/v1/slots/{id}"
        );
    }

    #[test]
    fn test_normalize_reconcile_endpoint() {
        assert_eq!(
            normalize_endpoint(
                "/internal/v1/accounts/0c9adaf6-54b3-4b85-9fcb-8e1f0b8f8f00/reconcile"
            ),
            "/internal/v1/accounts/{id}/reconcile"
        );
    }

    #[test]
    fn test_normalize_unknown_collapses() {
        assert_eq!(normalize_endpoint("/admin/drop-tables"), "/other");
        assert_eq!(normalize_endpoint("/v1/slots/a/b/c"), "/other");
    }

    #[test]
    fn test_record_functions_do_not_panic() {
        // No global recorder installed in unit tests; calls must be no-ops.
        record_http_request("POST", "/v1/sessions/go-live", 200, Duration::from_millis(5));
        record_go_live("success", None, Duration::from_millis(10));
        record_go_live("error", Some("slot_ended"), Duration::from_millis(1));
        record_session_signal("pause", "noop");
        record_recording_webhook("processed", "mapping", Duration::from_millis(3));
        record_expiry_transitions("completed", 4);
        record_payout_transfer("transferred", None);
        record_reconciliation("tip", 2);
        record_db_query("find_slot_by_token", "success", Duration::from_millis(2));
    }
}

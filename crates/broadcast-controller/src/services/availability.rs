//! Availability rules for booking validation.
//!
//! A candidate interval is valid only if every sub-segment is simultaneously
//! un-booked and outside the lead-time exclusion window. Overlap against
//! existing non-cancelled bookings is checked at second granularity via
//! half-open interval arithmetic; the database query in
//! `SlotsRepository::count_overlapping` applies the same predicate.

use chrono::{DateTime, Duration, Utc};

/// Why a candidate interval was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityDenial {
    /// Interval is empty or inverted.
    EmptyInterval,

    /// Interval starts inside the minimum-lead-time exclusion window.
    InsideLeadTime,

    /// Interval crosses a day boundary.
    CrossesDayBoundary,
}

impl AvailabilityDenial {
    /// User-facing message for the rejection.
    pub fn message(&self) -> &'static str {
        match self {
            AvailabilityDenial::EmptyInterval => "The requested interval is empty",
            AvailabilityDenial::InsideLeadTime => {
                "Bookings must start after the minimum lead time"
            }
            AvailabilityDenial::CrossesDayBoundary => "Bookings may not cross a day boundary",
        }
    }
}

/// Validate the shape of a candidate booking window: non-empty, outside the
/// lead-time exclusion window, and contained within one calendar day (UTC).
///
/// An interval ending exactly at midnight still counts as the same day.
pub fn validate_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    lead_time_hours: i64,
) -> Result<(), AvailabilityDenial> {
    if end <= start {
        return Err(AvailabilityDenial::EmptyInterval);
    }

    if start < now + Duration::hours(lead_time_hours) {
        return Err(AvailabilityDenial::InsideLeadTime);
    }

    // The last occupied second decides the day; an end at exactly midnight
    // belongs to the preceding day.
    let last_second = end - Duration::seconds(1);
    if start.date_naive() != last_second.date_naive() {
        return Err(AvailabilityDenial::CrossesDayBoundary);
    }

    Ok(())
}

/// Half-open interval overlap: `[a_start, a_end)` vs `[b_start, b_end)`.
///
/// Back-to-back bookings (one ending exactly when the next starts) do not
/// overlap.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_valid_window() {
        let now = ts("2026-09-01T12:00:00Z");
        let result = validate_window(
            ts("2026-09-10T20:00:00Z"),
            ts("2026-09-10T22:00:00Z"),
            now,
            48,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_rejects_empty_interval() {
        let now = ts("2026-09-01T12:00:00Z");
        let result = validate_window(
            ts("2026-09-10T20:00:00Z"),
            ts("2026-09-10T20:00:00Z"),
            now,
            48,
        );
        assert_eq!(result, Err(AvailabilityDenial::EmptyInterval));
    }

    #[test]
    fn test_rejects_inverted_interval() {
        let now = ts("2026-09-01T12:00:00Z");
        let result = validate_window(
            ts("2026-09-10T22:00:00Z"),
            ts("2026-09-10T20:00:00Z"),
            now,
            48,
        );
        assert_eq!(result, Err(AvailabilityDenial::EmptyInterval));
    }

    #[test]
    fn test_rejects_start_inside_lead_time() {
        let now = ts("2026-09-09T12:00:00Z");
        // Starts 32h out, lead time is 48h
        let result = validate_window(
            ts("2026-09-10T20:00:00Z"),
            ts("2026-09-10T22:00:00Z"),
            now,
            48,
        );
        assert_eq!(result, Err(AvailabilityDenial::InsideLeadTime));
    }

    #[test]
    fn test_accepts_start_exactly_at_lead_time() {
        let now = ts("2026-09-08T20:00:00Z");
        let result = validate_window(
            ts("2026-09-10T20:00:00Z"),
            ts("2026-09-10T22:00:00Z"),
            now,
            48,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_zero_lead_time_disables_exclusion() {
        let now = ts("2026-09-10T19:59:00Z");
        let result = validate_window(
            ts("2026-09-10T20:00:00Z"),
            ts("2026-09-10T22:00:00Z"),
            now,
            0,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_rejects_day_boundary_crossing() {
        let now = ts("2026-09-01T12:00:00Z");
        let result = validate_window(
            ts("2026-09-10T23:00:00Z"),
            ts("2026-09-11T01:00:00Z"),
            now,
            48,
        );
        assert_eq!(result, Err(AvailabilityDenial::CrossesDayBoundary));
    }

    #[test]
    fn test_accepts_end_exactly_at_midnight() {
        let now = ts("2026-09-01T12:00:00Z");
        let result = validate_window(
            ts("2026-09-10T22:00:00Z"),
            ts("2026-09-11T00:00:00Z"),
            now,
            48,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_overlaps_basic() {
        assert!(overlaps(
            ts("2026-09-10T20:00:00Z"),
            ts("2026-09-10T22:00:00Z"),
            ts("2026-09-10T21:00:00Z"),
            ts("2026-09-10T23:00:00Z"),
        ));
    }

    #[test]
    fn test_overlaps_containment() {
        assert!(overlaps(
            ts("2026-09-10T20:00:00Z"),
            ts("2026-09-10T23:00:00Z"),
            ts("2026-09-10T21:00:00Z"),
            ts("2026-09-10T22:00:00Z"),
        ));
    }

    #[test]
    fn test_back_to_back_does_not_overlap() {
        assert!(!overlaps(
            ts("2026-09-10T20:00:00Z"),
            ts("2026-09-10T22:00:00Z"),
            ts("2026-09-10T22:00:00Z"),
            ts("2026-09-10T23:00:00Z"),
        ));
    }

    #[test]
    fn test_disjoint_does_not_overlap() {
        assert!(!overlaps(
            ts("2026-09-10T20:00:00Z"),
            ts("2026-09-10T21:00:00Z"),
            ts("2026-09-10T22:00:00Z"),
            ts("2026-09-10T23:00:00Z"),
        ));
    }

    #[test]
    fn test_one_second_overlap_detected() {
        assert!(overlaps(
            ts("2026-09-10T20:00:00Z"),
            ts("2026-09-10T22:00:01Z"),
            ts("2026-09-10T22:00:00Z"),
            ts("2026-09-10T23:00:00Z"),
        ));
    }
}

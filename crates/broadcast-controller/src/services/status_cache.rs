//! TTL cache for payout destination readiness.
//!
//! The sweep checks one destination per DJ per pass; this cache keeps that
//! check from hitting the payments provider on every pass. Entries expire
//! rather than being invalidated, so a destination that becomes ready is
//! picked up within one TTL.

use crate::services::payments_client::DestinationStatus;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Default entry lifetime in seconds.
const DEFAULT_TTL_SECS: i64 = 300;

struct CacheEntry {
    status: DestinationStatus,
    fetched_at: DateTime<Utc>,
}

/// Time-bounded cache of destination statuses, keyed by payout account id.
pub struct DestinationStatusCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for DestinationStatusCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECS)
    }
}

impl DestinationStatusCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Return the cached status if present and not expired.
    pub async fn get(&self, destination: &str, now: DateTime<Utc>) -> Option<DestinationStatus> {
        let entries = self.entries.read().await;
        let entry = entries.get(destination)?;
        if now - entry.fetched_at >= self.ttl {
            return None;
        }
        Some(entry.status)
    }

    /// Store a freshly fetched status.
    pub async fn put(&self, destination: &str, status: DestinationStatus, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            destination.to_string(),
            CacheEntry {
                status,
                fetched_at: now,
            },
        );
    }
}

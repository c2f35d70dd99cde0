//! Stored Entry Module
//!
//! Raw value slot of the memory backend with optional expiry.

use chrono::Utc;

// == Stored Entry ==
/// A raw string value as the backend sees it, with expiry metadata.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// Serialized payload, opaque to the backend
    pub value: String,
    /// Write timestamp (Unix milliseconds)
    pub stored_at: i64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<i64>,
}

impl StoredEntry {
    // == Constructor ==
    /// Creates a new entry that expires `ttl_secs` from now, or never.
    pub fn new(value: String, ttl_secs: Option<u64>) -> Self {
        let now = current_timestamp_ms();
        let expires_at = ttl_secs.map(|ttl| now.saturating_add((ttl as i64).saturating_mul(1000)));

        Self {
            value,
            stored_at: now,
            expires_at,
        }
    }

    // == Is Expired ==
    /// An entry is expired once the current time reaches its expiry.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Expiry check against an explicit clock reading.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(expires) if now_ms >= expires)
    }

    // == Time To Live ==
    /// Remaining TTL in milliseconds; `Some(0)` once expired, `None` without expiry.
    pub fn ttl_remaining_ms(&self) -> Option<i64> {
        self.expires_at
            .map(|expires| (expires - current_timestamp_ms()).max(0))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

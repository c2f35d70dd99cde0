//! Cache Entry Envelope
//!
//! Every stored value is wrapped as `{"value": <T>, "timestamp": <epoch-ms>}`.

use chrono::{DateTime, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Cache Entry ==
/// A value plus the moment it was written. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    /// Write time in Unix milliseconds
    #[serde(rename = "timestamp")]
    pub written_at_ms: i64,
}

impl<T> CacheEntry<T> {
    /// Stamps `value` with the current time.
    pub fn new(value: T) -> Self {
        Self {
            value,
            written_at_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.written_at_ms).single()
    }

    /// Milliseconds since the entry was written.
    pub fn age_ms(&self) -> i64 {
        (Utc::now().timestamp_millis() - self.written_at_ms).max(0)
    }
}

/// Serializes `value` inside a fresh envelope.
pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(&CacheEntry::new(value))?)
}

/// Parses a stored payload. A payload that is not a valid envelope for `T`
/// is an operation error, distinct from an absent key.
pub fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<CacheEntry<T>> {
    serde_json::from_str(raw)
        .map_err(|e| CacheError::Operation(format!("corrupted cache entry at '{}': {}", key, e)))
}

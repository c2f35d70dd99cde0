//! Memory Store Module
//!
//! HashMap storage with LRU tracking and TTL expiration, exposing the
//! command set the cache layer needs from a Redis-protocol store.

use std::collections::HashMap;

use super::entry::{current_timestamp_ms, StoredEntry};
use super::lru::LruTracker;
use super::stats::StoreStats;
use crate::backend::{glob_match, TxOp};

// == Memory Store ==
/// Key-value storage with LRU eviction and TTL support.
#[derive(Debug)]
pub struct MemoryStore {
    entries: HashMap<String, StoredEntry>,
    lru: LruTracker,
    stats: StoreStats,
    /// Maximum number of keys before LRU eviction kicks in
    max_entries: usize,
}

impl MemoryStore {
    // == Constructor ==
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: StoreStats::new(),
            max_entries: max_entries.max(1),
        }
    }

    // == Set ==
    /// SET with optional expiry. Overwrites replace the value and reset the TTL.
    /// At capacity the least recently used key is evicted first.
    pub fn set(&mut self, key: String, value: String, ttl_secs: Option<u64>) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            if let Some(evicted) = self.lru.evict_oldest() {
                self.entries.remove(&evicted);
                self.stats.record_eviction();
            }
        }

        self.entries.insert(key.clone(), StoredEntry::new(value, ttl_secs));
        self.lru.touch(&key);
        self.stats.set_total_entries(self.entries.len());
    }

    // == Get ==
    /// GET. Expired keys are dropped on access and read as absent.
    pub fn get(&mut self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            None => {
                self.stats.record_miss();
                return None;
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_expirations(1);
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        self.lru.touch(key);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Delete ==
    /// DEL over several keys. Returns how many live keys were removed.
    pub fn delete(&mut self, keys: &[String]) -> u64 {
        let now = current_timestamp_ms();
        keys.iter()
            .filter(|key| match self.remove_entry(key) {
                Some(entry) => !entry.is_expired_at(now),
                None => false,
            })
            .count() as u64
    }

    // == Keys ==
    /// KEYS. Live keys matching the glob pattern, sorted.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let now = current_timestamp_ms();
        let mut matches: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired_at(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        matches.sort();
        matches
    }

    // == Apply Transaction ==
    /// Applies every queued operation. The caller holds the write lock for
    /// the whole call, so no reader observes a partial result.
    pub fn apply(&mut self, ops: Vec<TxOp>) -> u64 {
        let mut deleted = 0;
        for op in ops {
            match op {
                TxOp::Set {
                    key,
                    value,
                    ttl_secs,
                } => self.set(key, value, ttl_secs),
                TxOp::Del { key } => deleted += self.delete(std::slice::from_ref(&key)),
            }
        }
        self.stats.record_transaction();
        deleted
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns how many were removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
        }
        self.stats.record_expirations(expired.len());
        expired.len()
    }

    /// Remaining TTL of a key in milliseconds, for diagnostics.
    pub fn ttl_ms(&self, key: &str) -> Option<i64> {
        self.entries.get(key).and_then(StoredEntry::ttl_remaining_ms)
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_entry(&mut self, key: &str) -> Option<StoredEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.lru.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }
}

//! Store Statistics Module
//!
//! Counters kept by the memory backend.

use serde::Serialize;

// == Store Stats ==
/// Memory backend counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// GETs that found a live key
    pub hits: u64,
    /// GETs that found nothing or an expired key
    pub misses: u64,
    /// Keys dropped by LRU at capacity
    pub evictions: u64,
    /// Keys dropped because their TTL elapsed
    pub expirations: u64,
    /// Committed MULTI/EXEC blocks
    pub transactions: u64,
    /// Current number of keys
    pub total_entries: usize,
}

impl StoreStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// hits / (hits + misses), or 0.0 before any read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    pub fn record_transaction(&mut self) {
        self.transactions += 1;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(StoreStats::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = StoreStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_counters() {
        let mut stats = StoreStats::new();
        stats.record_eviction();
        stats.record_expirations(3);
        stats.record_transaction();
        stats.set_total_entries(42);

        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.expirations, 3);
        assert_eq!(stats.transactions, 1);
        assert_eq!(stats.total_entries, 42);
    }
}

//! Memory Backend Module
//!
//! In-process Redis-compatible store with TTL expiration and LRU eviction.
//! Every connection shares one store behind a tokio `RwLock`; transactions
//! run under a single write lock, which makes them atomic.

mod entry;
mod lru;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Connection, ConnectionFactory, Transaction};
use crate::error::{CacheError, Result};

pub use entry::{current_timestamp_ms, StoredEntry};
pub use lru::LruTracker;
pub use stats::StoreStats;
pub use store::MemoryStore;

// == Memory Backend ==
/// Connection factory over a shared [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    store: Arc<RwLock<MemoryStore>>,
    /// Commands that will fail with a connection error before the store answers again
    injected_failures: Arc<AtomicU32>,
    /// Connections opened over the backend's lifetime
    connects: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(MemoryStore::new(max_entries))),
            injected_failures: Arc::new(AtomicU32::new(0)),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared handle to the underlying store, used by the sweeper task.
    pub fn store(&self) -> Arc<RwLock<MemoryStore>> {
        self.store.clone()
    }

    /// Makes the next `count` commands fail as if the server were unreachable.
    pub fn inject_failures(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub async fn stats(&self) -> StoreStats {
        self.store.read().await.stats()
    }
}

#[async_trait]
impl ConnectionFactory for MemoryBackend {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let id = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(connection = id, "memory backend connection opened");
        Ok(Box::new(MemoryConnection {
            store: self.store.clone(),
            injected_failures: self.injected_failures.clone(),
            closed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// == Memory Connection ==
/// One pooled handle onto the shared store.
#[derive(Debug)]
pub struct MemoryConnection {
    store: Arc<RwLock<MemoryStore>>,
    injected_failures: Arc<AtomicU32>,
    closed: bool,
}

impl MemoryConnection {
    fn check(&self) -> Result<()> {
        if self.closed {
            return Err(CacheError::Connection("connection is closed".to_string()));
        }
        let tripped = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(CacheError::Connection(
                "memory backend unavailable (injected)".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.check()?;
        let mut store = self.store.write().await;
        let value = store.get(key);
        debug!(key = %key, hit = value.is_some(), ttl_ms = ?store.ttl_ms(key), "memory get");
        Ok(value)
    }

    async fn set(&mut self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        self.check()?;
        self.store
            .write()
            .await
            .set(key.to_string(), value.to_string(), ttl_secs);
        Ok(())
    }

    async fn del(&mut self, keys: &[String]) -> Result<u64> {
        self.check()?;
        Ok(self.store.write().await.delete(keys))
    }

    async fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.store.read().await.keys(pattern))
    }

    async fn exec(&mut self, tx: Transaction) -> Result<u64> {
        self.check()?;
        Ok(self.store.write().await.apply(tx.into_ops()))
    }

    async fn ping(&mut self) -> Result<()> {
        self.check()
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connections_share_one_store() {
        let backend = MemoryBackend::new(100);
        let mut a = backend.connect().await.unwrap();
        let mut b = backend.connect().await.unwrap();

        a.set("team:1", "arsenal", Some(60)).await.unwrap();
        assert_eq!(b.get("team:1").await.unwrap(), Some("arsenal".to_string()));
        assert_eq!(backend.connects(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let backend = MemoryBackend::new(100);
        let mut conn = backend.connect().await.unwrap();

        backend.inject_failures(2);
        assert!(matches!(conn.ping().await, Err(CacheError::Connection(_))));
        assert!(matches!(conn.ping().await, Err(CacheError::Connection(_))));
        assert!(conn.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_commands() {
        let backend = MemoryBackend::new(100);
        let mut conn = backend.connect().await.unwrap();

        conn.close().await;
        assert!(matches!(conn.get("x").await, Err(CacheError::Connection(_))));
    }

    #[tokio::test]
    async fn test_exec_applies_all_ops() {
        let backend = MemoryBackend::new(100);
        let mut conn = backend.connect().await.unwrap();
        conn.set("team:7", "v", None).await.unwrap();
        conn.set("player:team:7", "v", None).await.unwrap();

        let mut tx = Transaction::new();
        tx.del("team:7");
        tx.del("player:team:7");
        assert_eq!(conn.exec(tx).await.unwrap(), 2);
        assert!(conn.keys("*").await.unwrap().is_empty());
    }
}

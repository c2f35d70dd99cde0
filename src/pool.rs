//! Connection Pool Module
//!
//! Bounded set of reusable backend connections. Every cache operation checks
//! a connection out, uses it and hands it back, so exhaustion heals as soon as
//! in-flight operations finish.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{Connection, ConnectionFactory};
use crate::error::{CacheError, Result};

// == Pool Config ==
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on simultaneously open connections
    pub max_connections: usize,
    /// How long `acquire` may wait for a connection to free up
    pub acquire_timeout: Duration,
    /// Re-check interval while waiting, in case a wake-up is missed
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_connections: usize,
    pub open: usize,
    pub idle: usize,
    pub in_use: usize,
    pub closed: bool,
}

struct PoolState {
    idle: Vec<Box<dyn Connection>>,
    /// Opened (or being opened) connections, idle and checked out alike
    open: usize,
    closed: bool,
}

struct PoolInner {
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
    available: Notify,
    config: PoolConfig,
}

impl PoolInner {
    fn give_back(&self, conn: Box<dyn Connection>) {
        let stale = {
            let mut state = self.state.lock();
            if state.closed {
                state.open = state.open.saturating_sub(1);
                Some(conn)
            } else {
                state.idle.push(conn);
                None
            }
        };
        self.available.notify_one();

        if let Some(mut conn) = stale {
            // Outside a runtime the drop alone releases the socket
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { conn.close().await });
            }
        }
    }

    fn free_slot(&self) {
        {
            let mut state = self.state.lock();
            state.open = state.open.saturating_sub(1);
        }
        self.available.notify_one();
    }
}

enum Checkout {
    Idle(Box<dyn Connection>),
    Open,
    Wait,
}

/// A slot claimed for a connection that is still being opened. Releases the
/// slot if the open fails or the acquiring future is dropped mid-way.
struct Reservation<'a> {
    inner: &'a PoolInner,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.free_slot();
        }
    }
}

// == Connection Pool ==
/// Cloneable handle to a shared pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    // == Constructor ==
    /// Creates an empty pool. Connections are opened lazily on demand.
    /// A `max_connections` of zero is raised to one.
    pub fn new(factory: Arc<dyn ConnectionFactory>, mut config: PoolConfig) -> Self {
        config.max_connections = config.max_connections.max(1);
        Self {
            inner: Arc::new(PoolInner {
                factory,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    open: 0,
                    closed: false,
                }),
                available: Notify::new(),
                config,
            }),
        }
    }

    // == Acquire ==
    /// Checks out a connection.
    ///
    /// Prefers an idle connection, then opens a new one below
    /// `max_connections`, then waits until one is released. Fails with a
    /// connection error after `acquire_timeout` or once the pool is shut down.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let config = &self.inner.config;
        let deadline = Instant::now() + config.acquire_timeout;

        loop {
            match self.try_checkout()? {
                Checkout::Idle(conn) => return Ok(self.wrap(conn)),
                Checkout::Open => {
                    let mut reservation = Reservation {
                        inner: &self.inner,
                        armed: true,
                    };
                    let conn = self.inner.factory.connect().await.map_err(|e| {
                        warn!(backend = self.inner.factory.name(), error = %e, "failed to open connection");
                        match e {
                            CacheError::Connection(_) => e,
                            other => CacheError::Connection(other.to_string()),
                        }
                    })?;
                    reservation.armed = false;
                    debug!(backend = self.inner.factory.name(), "opened pooled connection");
                    return Ok(self.wrap(conn));
                }
                Checkout::Wait => {}
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    timeout_ms = config.acquire_timeout.as_millis() as u64,
                    max_connections = config.max_connections,
                    "timed out waiting for a pooled connection"
                );
                return Err(CacheError::Connection(format!(
                    "timed out after {}ms waiting for a connection",
                    config.acquire_timeout.as_millis()
                )));
            }

            let wait = (deadline - now).min(config.poll_interval);
            let _ = tokio::time::timeout(wait, self.inner.available.notified()).await;
        }
    }

    fn try_checkout(&self) -> Result<Checkout> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(CacheError::Connection("connection pool is shut down".to_string()));
        }
        if let Some(conn) = state.idle.pop() {
            return Ok(Checkout::Idle(conn));
        }
        if state.open < self.inner.config.max_connections {
            state.open += 1;
            return Ok(Checkout::Open);
        }
        Ok(Checkout::Wait)
    }

    fn wrap(&self, conn: Box<dyn Connection>) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
        }
    }

    // == Release ==
    /// Returns a connection to the pool. Equivalent to dropping the guard.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    // == Shutdown ==
    /// Closes every idle connection and refuses further checkouts.
    /// Connections still checked out are closed when they come back.
    pub async fn shutdown(&self) {
        let idle = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.open = state.open.saturating_sub(state.idle.len());
            std::mem::take(&mut state.idle)
        };

        let count = idle.len();
        for mut conn in idle {
            conn.close().await;
        }
        self.inner.available.notify_waiters();
        info!(closed = count, "connection pool shut down");
    }

    // == Status ==
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            max_connections: self.inner.config.max_connections,
            open: state.open,
            idle: state.idle.len(),
            in_use: state.open - state.idle.len(),
            closed: state.closed,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.factory.name()
    }
}

// == Pooled Connection ==
/// A checked-out connection. Goes back to the pool on drop.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    /// Drops the connection instead of pooling it, freeing its slot.
    /// Used after a connection-level failure.
    pub fn discard(mut self) {
        if self.conn.take().is_some() {
            self.pool.free_slot();
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        // Only `discard` and `drop` take the connection, both consuming self
        self.conn.as_deref().expect("pooled connection already returned")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("pooled connection already returned")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn pool_with(max: usize, timeout_ms: u64) -> (ConnectionPool, MemoryBackend) {
        let backend = MemoryBackend::new(100);
        let pool = ConnectionPool::new(
            Arc::new(backend.clone()),
            PoolConfig {
                max_connections: max,
                acquire_timeout: Duration::from_millis(timeout_ms),
                poll_interval: Duration::from_millis(10),
            },
        );
        (pool, backend)
    }

    struct RefusingFactory;

    #[async_trait]
    impl ConnectionFactory for RefusingFactory {
        async fn connect(&self) -> Result<Box<dyn Connection>> {
            Err(CacheError::Connection("connection refused".to_string()))
        }

        fn name(&self) -> &'static str {
            "refusing"
        }
    }

    /// Connection that only records how often it was closed.
    struct TrackedConnection {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connection for TrackedConnection {
        async fn get(&mut self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn set(&mut self, _key: &str, _value: &str, _ttl_secs: Option<u64>) -> Result<()> {
            Ok(())
        }

        async fn del(&mut self, _keys: &[String]) -> Result<u64> {
            Ok(0)
        }

        async fn keys(&mut self, _pattern: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn exec(&mut self, _tx: crate::backend::Transaction) -> Result<u64> {
            Ok(0)
        }

        async fn ping(&mut self) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TrackingFactory {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ConnectionFactory for TrackingFactory {
        async fn connect(&self) -> Result<Box<dyn Connection>> {
            Ok(Box::new(TrackedConnection {
                closes: self.closes.clone(),
            }))
        }

        fn name(&self) -> &'static str {
            "tracking"
        }
    }

    #[tokio::test]
    async fn test_idle_connection_is_reused() {
        let (pool, backend) = pool_with(2, 100);

        let conn = pool.acquire().await.unwrap();
        pool.release(conn);
        let _conn = pool.acquire().await.unwrap();

        assert_eq!(backend.connects(), 1);
        assert_eq!(pool.status().in_use, 1);
    }

    #[tokio::test]
    async fn test_acquire_blocks_until_release() {
        let (pool, _backend) = pool_with(1, 2000);
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "acquire should wait while the pool is full");

        drop(held);
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after release")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let (pool, _backend) = pool_with(1, 100);
        let _held = pool.acquire().await.unwrap();

        let started = std::time::Instant::now();
        let result = pool.acquire().await;

        assert!(matches!(result, Err(CacheError::Connection(_))));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_acquire_fails_after_shutdown() {
        let (pool, _backend) = pool_with(2, 100);
        let conn = pool.acquire().await.unwrap();
        drop(conn);

        pool.shutdown().await;

        assert!(matches!(pool.acquire().await, Err(CacheError::Connection(_))));
        let status = pool.status();
        assert!(status.closed);
        assert_eq!(status.open, 0);
    }

    #[tokio::test]
    async fn test_connection_returned_after_shutdown_is_closed() {
        let (pool, _backend) = pool_with(2, 100);
        let conn = pool.acquire().await.unwrap();

        pool.shutdown().await;
        assert_eq!(pool.status().open, 1);
        drop(conn);

        assert_eq!(pool.status().open, 0);
        assert_eq!(pool.status().idle, 0);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiting_acquire() {
        let pool = ConnectionPool::new(
            Arc::new(MemoryBackend::new(10)),
            PoolConfig {
                max_connections: 1,
                acquire_timeout: Duration::from_secs(10),
                // long enough that only the shutdown wake-up can end the wait
                poll_interval: Duration::from_secs(5),
            },
        );
        let _held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        let started = std::time::Instant::now();
        pool.shutdown().await;
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("shutdown should wake the waiter")
            .unwrap();

        assert!(matches!(result, Err(CacheError::Connection(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_returned_and_idle_connections_are_closed_on_shutdown() {
        let closes = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(
            Arc::new(TrackingFactory {
                closes: closes.clone(),
            }),
            PoolConfig::default(),
        );
        let idle = pool.acquire().await.unwrap();
        let busy = pool.acquire().await.unwrap();
        drop(idle);

        pool.shutdown().await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        drop(busy);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 2);
        assert_eq!(pool.status().open, 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let (pool, _backend) = pool_with(0, 50);

        assert!(pool.acquire().await.is_ok());
        assert_eq!(pool.status().max_connections, 1);
    }

    #[tokio::test]
    async fn test_failed_open_frees_slot() {
        let pool = ConnectionPool::new(
            Arc::new(RefusingFactory),
            PoolConfig {
                max_connections: 1,
                acquire_timeout: Duration::from_millis(50),
                poll_interval: Duration::from_millis(10),
            },
        );

        assert!(matches!(pool.acquire().await, Err(CacheError::Connection(_))));
        assert_eq!(pool.status().open, 0);
    }

    #[tokio::test]
    async fn test_discard_frees_slot() {
        let (pool, backend) = pool_with(1, 100);

        let conn = pool.acquire().await.unwrap();
        conn.discard();
        let _fresh = pool.acquire().await.unwrap();

        assert_eq!(backend.connects(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_respect_capacity() {
        let (pool, _backend) = pool_with(3, 5000);
        let peak = Arc::new(Mutex::new(0usize));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let pool = pool.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let mut conn = pool.acquire().await.unwrap();
                {
                    let mut peak = peak.lock();
                    *peak = (*peak).max(pool.status().in_use);
                }
                conn.ping().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(*peak.lock() <= 3);
        assert_eq!(pool.status().in_use, 0);
        assert!(pool.status().open <= 3);
    }
}

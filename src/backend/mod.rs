//! Backend Module
//!
//! The command seam between the connection pool and a Redis-protocol store.
//! Two implementations ship: a Redis client and an in-process memory store.

mod glob;
pub mod memory;
pub mod redis_store;

use async_trait::async_trait;

use crate::error::Result;

pub use self::glob::glob_match;
pub use self::memory::{MemoryBackend, MemoryConnection};
pub use self::redis_store::{RedisConnection, RedisConnector};

// == Transaction ==
/// One command queued inside a MULTI/EXEC block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOp {
    Set {
        key: String,
        value: String,
        ttl_secs: Option<u64>,
    },
    Del {
        key: String,
    },
}

/// Commands queued for atomic execution.
///
/// Dropping a transaction without passing it to [`Connection::exec`]
/// discards it; nothing reaches the backend until commit.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    ops: Vec<TxOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a SET.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>, ttl_secs: Option<u64>) {
        self.ops.push(TxOp::Set {
            key: key.into(),
            value: value.into(),
            ttl_secs,
        });
    }

    /// Queues a DEL.
    pub fn del(&mut self, key: impl Into<String>) {
        self.ops.push(TxOp::Del { key: key.into() });
    }

    /// Appends already-built operations.
    pub fn extend(&mut self, ops: impl IntoIterator<Item = TxOp>) {
        self.ops.extend(ops);
    }

    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<TxOp> {
        self.ops
    }
}

// == Connection ==
/// A single checked-out connection to the backing store.
#[async_trait]
pub trait Connection: Send {
    /// GET. `None` when the key does not exist.
    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// SET, with `EX ttl_secs` when a TTL is given.
    async fn set(&mut self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()>;

    /// DEL. Returns the number of keys removed.
    async fn del(&mut self, keys: &[String]) -> Result<u64>;

    /// KEYS with a glob pattern.
    async fn keys(&mut self, pattern: &str) -> Result<Vec<String>>;

    /// MULTI / queued commands / EXEC. Returns the number of keys deleted.
    async fn exec(&mut self, tx: Transaction) -> Result<u64>;

    /// PING.
    async fn ping(&mut self) -> Result<()>;

    /// Releases backend resources held by this connection.
    async fn close(&mut self) {}
}

/// Opens new connections for the pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

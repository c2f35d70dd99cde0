//! Redis Backend Module
//!
//! Connections to a Redis-protocol server using the `redis` crate's
//! multiplexed async connection. The pool owns these one per checkout.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::debug;

use super::{Connection, ConnectionFactory, Transaction, TxOp};
use crate::error::{CacheError, Result};

// == Redis Connector ==
/// Opens connections against one Redis URL.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: Client,
}

impl RedisConnector {
    /// Parses the URL; does not connect yet.
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| CacheError::Validation(format!("invalid redis url: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ConnectionFactory for RedisConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(format!("redis connect failed: {}", e)))?;
        debug!("redis connection opened");
        Ok(Box::new(RedisConnection { conn }))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// == Redis Connection ==
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

#[async_trait]
impl Connection for RedisConnection {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut self.conn).await?;
        Ok(value)
    }

    async fn set(&mut self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl_secs {
            cmd.arg("EX").arg(ttl);
        }
        let _: () = cmd.query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn del(&mut self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = redis::cmd("DEL").arg(keys).query_async(&mut self.conn).await?;
        Ok(removed)
    }

    async fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut self.conn)
            .await?;
        keys.sort();
        Ok(keys)
    }

    async fn exec(&mut self, tx: Transaction) -> Result<u64> {
        if tx.is_empty() {
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in tx.into_ops() {
            match op {
                TxOp::Set {
                    key,
                    value,
                    ttl_secs: Some(ttl),
                } => {
                    pipe.cmd("SET").arg(key).arg(value).arg("EX").arg(ttl).ignore();
                }
                TxOp::Set {
                    key,
                    value,
                    ttl_secs: None,
                } => {
                    pipe.cmd("SET").arg(key).arg(value).ignore();
                }
                TxOp::Del { key } => {
                    pipe.cmd("DEL").arg(key);
                }
            }
        }

        let removed: Vec<u64> = pipe.query_async(&mut self.conn).await?;
        Ok(removed.into_iter().sum())
    }

    async fn ping(&mut self) -> Result<()> {
        let reply: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(CacheError::Operation(format!("unexpected PING reply: {}", reply)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_rejects_bad_url() {
        assert!(matches!(
            RedisConnector::new("not a url"),
            Err(CacheError::Validation(_))
        ));
    }

    #[test]
    fn test_connector_accepts_redis_url() {
        let connector = RedisConnector::new("redis://127.0.0.1:6379").unwrap();
        assert_eq!(connector.name(), "redis");
    }
}

//! Keyed Cache
//!
//! Typed get/set/delete over opaque keys. Each call checks out one pooled
//! connection and runs under the retry wrapper.

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::envelope::{decode, encode, CacheEntry};
use crate::backend::Transaction;
use crate::error::{CacheError, Result};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::retry::{with_retry, RetryConfig};

/// TTL written with health-check probes.
const HEALTH_TTL_SECS: u64 = 60;

// == Keyed Cache ==
#[derive(Clone)]
pub struct KeyedCache {
    pool: ConnectionPool,
    retry: RetryConfig,
}

impl KeyedCache {
    pub fn new(pool: ConnectionPool, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    // == Set ==
    /// Writes `value` in an envelope. `ttl_secs` of `None` stores without expiry.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<i64>) -> Result<()> {
        validate_key(key)?;
        let ttl = validate_ttl(ttl_secs)?;
        let payload = encode(value)?;
        let payload = payload.as_str();

        with_retry("set", &self.retry, || async move {
            let mut conn = self.pool.acquire().await?;
            let result = conn.set(key, payload, ttl).await;
            finish(conn, result)
        })
        .await?;

        debug!(key = %key, ttl_secs = ?ttl, "cache set");
        Ok(())
    }

    /// Writes several values in one MULTI/EXEC block; all land or none do.
    pub async fn set_many<K, T>(&self, entries: &[(K, T)], ttl_secs: Option<i64>) -> Result<()>
    where
        K: AsRef<str>,
        T: Serialize,
    {
        let ttl = validate_ttl(ttl_secs)?;
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            validate_key(key.as_ref())?;
            encoded.push((key.as_ref(), encode(value)?));
        }
        if encoded.is_empty() {
            return Ok(());
        }
        let encoded = encoded.as_slice();

        with_retry("set_many", &self.retry, || async move {
            let mut tx = Transaction::new();
            for (key, payload) in encoded {
                tx.set(*key, payload.as_str(), ttl);
            }
            let mut conn = self.pool.acquire().await?;
            let result = conn.exec(tx).await;
            finish(conn, result)
        })
        .await?;

        debug!(count = encoded.len(), ttl_secs = ?ttl, "cache batch set");
        Ok(())
    }

    // == Get ==
    /// Reads a value. `Ok(None)` means the key is not cached.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    /// Reads the full envelope, including its write timestamp.
    pub async fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
        validate_key(key)?;

        let raw = with_retry("get", &self.retry, || async move {
            let mut conn = self.pool.acquire().await?;
            let result = conn.get(key).await;
            finish(conn, result)
        })
        .await?;

        match raw {
            None => {
                debug!(key = %key, "cache miss");
                Ok(None)
            }
            Some(raw) => match decode(key, &raw) {
                Ok(entry) => {
                    debug!(key = %key, age_ms = entry.age_ms(), "cache hit");
                    Ok(Some(entry))
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "undecodable cache entry");
                    Err(err)
                }
            },
        }
    }

    // == Delete ==
    /// Removes a key. Returns how many keys were removed (0 or 1).
    pub async fn del(&self, key: &str) -> Result<u64> {
        validate_key(key)?;
        self.del_many(&[key.to_string()]).await
    }

    /// Removes several keys in one DEL.
    pub async fn del_many(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let removed = with_retry("del", &self.retry, || async move {
            let mut conn = self.pool.acquire().await?;
            let result = conn.del(keys).await;
            finish(conn, result)
        })
        .await?;

        debug!(requested = keys.len(), removed, "cache delete");
        Ok(removed)
    }

    /// Keys matching a glob pattern.
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        validate_key(pattern)?;
        with_retry("keys", &self.retry, || async move {
            let mut conn = self.pool.acquire().await?;
            let result = conn.keys(pattern).await;
            finish(conn, result)
        })
        .await
    }

    pub async fn ping(&self) -> Result<()> {
        with_retry("ping", &self.retry, || async move {
            let mut conn = self.pool.acquire().await?;
            let result = conn.ping().await;
            finish(conn, result)
        })
        .await
    }

    // == Health ==
    /// Round-trip SET on `health_key`. Single attempt; reports instead of failing.
    pub async fn check_health(&self, health_key: &str) -> bool {
        let probe = RetryConfig {
            max_retries: 0,
            ..self.retry.clone()
        };
        let payload = match encode(&"ok") {
            Ok(payload) => payload,
            Err(_) => return false,
        };
        let payload = payload.as_str();

        let result = with_retry("health", &probe, || async move {
            let mut conn = self.pool.acquire().await?;
            let result = conn.set(health_key, payload, Some(HEALTH_TTL_SECS)).await;
            finish(conn, result)
        })
        .await;

        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "cache health check failed");
                false
            }
        }
    }
}

/// Returns the connection to the pool, or drops it after a connection-level
/// failure so the pool opens a fresh one next time.
pub(crate) fn finish<T>(conn: PooledConnection, result: Result<T>) -> Result<T> {
    match &result {
        Err(CacheError::Connection(_)) => conn.discard(),
        _ => drop(conn),
    }
    result
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(CacheError::Validation("cache key must not be blank".to_string()));
    }
    Ok(())
}

/// Converts a caller TTL into backend seconds. Negative values are rejected.
/// Zero is written without expiry, since Redis refuses `EX 0`.
pub(crate) fn validate_ttl(ttl_secs: Option<i64>) -> Result<Option<u64>> {
    match ttl_secs {
        None | Some(0) => Ok(None),
        Some(ttl) if ttl > 0 => Ok(Some(ttl as u64)),
        Some(ttl) => Err(CacheError::Validation(format!(
            "ttl must not be negative, got {}",
            ttl
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::pool::PoolConfig;
    use serde::Deserialize;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Team {
        id: u32,
        name: String,
    }

    fn cache_with(max_retries: u32) -> (KeyedCache, MemoryBackend) {
        let backend = MemoryBackend::new(1000);
        let pool = ConnectionPool::new(Arc::new(backend.clone()), PoolConfig::default());
        let retry = RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            timeout: Duration::from_millis(500),
        };
        (KeyedCache::new(pool, retry), backend)
    }

    fn team() -> Team {
        Team {
            id: 7,
            name: "X".to_string(),
        }
    }

    #[tokio::test]
    async fn test_set_then_get_returns_same_value() {
        let (cache, _backend) = cache_with(3);

        cache.set("team:7", &team(), Some(86_400)).await.unwrap();

        assert_eq!(cache.get::<Team>("team:7").await.unwrap(), Some(team()));
    }

    #[tokio::test]
    async fn test_get_never_written_is_absent() {
        let (cache, _backend) = cache_with(3);
        assert_eq!(cache.get::<Team>("team:404").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_after_delete_is_absent() {
        let (cache, _backend) = cache_with(3);
        cache.set("team:7", &team(), None).await.unwrap();

        assert_eq!(cache.del("team:7").await.unwrap(), 1);
        assert_eq!(cache.get::<Team>("team:7").await.unwrap(), None);
        assert_eq!(cache.del("team:7").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_key_and_bad_ttl_are_validation_errors() {
        let (cache, backend) = cache_with(3);

        assert!(matches!(
            cache.set("  ", &team(), None).await,
            Err(CacheError::Validation(_))
        ));
        assert!(matches!(
            cache.set("team:7", &team(), Some(-5)).await,
            Err(CacheError::Validation(_))
        ));
        assert!(matches!(
            cache.get::<Team>("").await,
            Err(CacheError::Validation(_))
        ));
        // validation never reaches the backend
        assert_eq!(backend.connects(), 0);
    }

    #[tokio::test]
    async fn test_corrupted_payload_is_operation_error() {
        let (cache, _backend) = cache_with(3);
        cache.set("team:7", &"just a string", None).await.unwrap();

        assert!(matches!(
            cache.get::<Team>("team:7").await,
            Err(CacheError::Operation(_))
        ));
    }

    #[tokio::test]
    async fn test_transient_backend_failures_are_retried() {
        let (cache, backend) = cache_with(3);
        cache.set("team:7", &team(), None).await.unwrap();

        backend.inject_failures(2);
        assert_eq!(cache.get::<Team>("team:7").await.unwrap(), Some(team()));
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_connection_error() {
        let (cache, backend) = cache_with(1);

        backend.inject_failures(10);
        assert!(matches!(
            cache.get::<Team>("team:7").await,
            Err(CacheError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_set_many_writes_every_entry() {
        let (cache, _backend) = cache_with(3);
        let entries = vec![
            ("team:1".to_string(), team()),
            ("team:2".to_string(), team()),
        ];

        cache.set_many(&entries, Some(60)).await.unwrap();

        assert_eq!(cache.keys("team:*").await.unwrap(), vec!["team:1", "team:2"]);
    }

    #[tokio::test]
    async fn test_entry_carries_timestamp() {
        let (cache, _backend) = cache_with(3);
        cache.set("team:7", &team(), None).await.unwrap();

        let entry = cache.get_entry::<Team>("team:7").await.unwrap().unwrap();
        assert!(entry.written_at().is_some());
    }

    #[tokio::test]
    async fn test_check_health() {
        let (cache, backend) = cache_with(3);
        assert!(cache.check_health("health:check").await);
        assert!(cache.ping().await.is_ok());

        backend.inject_failures(1);
        assert!(!cache.check_health("health:check").await);
    }

    #[test]
    fn test_validate_ttl() {
        assert_eq!(validate_ttl(None).unwrap(), None);
        assert_eq!(validate_ttl(Some(3600)).unwrap(), Some(3600));
        assert_eq!(validate_ttl(Some(0)).unwrap(), None);
        assert!(validate_ttl(Some(-1)).is_err());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_stored_without_expiry() {
        let (cache, backend) = cache_with(3);

        tokio_test::assert_ok!(cache.set("team:7", &team(), Some(0)).await);

        assert_eq!(cache.get::<Team>("team:7").await.unwrap(), Some(team()));
        assert_eq!(backend.store().read().await.ttl_ms("team:7"), None);
        tokio_test::assert_err!(cache.set("team:7", &team(), Some(-1)).await);
    }
}

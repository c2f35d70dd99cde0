//! Domain Cache Service
//!
//! The contract services call: typed read-through caching for one domain,
//! backed by a [`DataProvider`]. Reads treat any cache failure as a miss and
//! go to the provider, so a cache outage costs latency, not availability.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::KeyedCache;
use crate::error::{CacheError, Result};
use crate::invalidation::InvalidationEngine;
use crate::keys::{CacheKey, Domain, KeyRegistry};
use crate::provider::DataProvider;

/// An entity that can be cached under its own id.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn cache_id(&self) -> String;
}

// == Domain Cache ==
pub struct DomainCache<T, P> {
    domain: Domain,
    cache: KeyedCache,
    engine: InvalidationEngine,
    provider: P,
    _entity: PhantomData<fn() -> T>,
}

impl<T, P> DomainCache<T, P>
where
    T: Cacheable,
    P: DataProvider<T>,
{
    pub fn new(domain: Domain, cache: KeyedCache, engine: InvalidationEngine, provider: P) -> Self {
        Self {
            domain,
            cache,
            engine,
            provider,
            _entity: PhantomData,
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn registry(&self) -> &KeyRegistry {
        self.engine.registry()
    }

    fn ttl(&self) -> Option<i64> {
        Some(self.domain.ttl_secs() as i64)
    }

    fn entity_key(&self, id: &str) -> CacheKey {
        self.registry().primary_key(self.domain, id)
    }

    // == Writes ==
    /// Caches one entity under its primary key with the domain TTL.
    pub async fn cache_one(&self, item: &T) -> Result<()> {
        let key = self.entity_key(&item.cache_id());
        self.cache.set(key.as_str(), item, self.ttl()).await
    }

    /// Caches the full collection under the domain's `all` key.
    pub async fn cache_many(&self, items: &[T]) -> Result<()> {
        let key = self.registry().collection_key(self.domain);
        self.cache.set(key.as_str(), &items, self.ttl()).await
    }

    /// Caches each entity under its own key in one atomic write.
    pub async fn cache_batch(&self, items: &[T]) -> Result<()> {
        let entries: Vec<(CacheKey, &T)> = items
            .iter()
            .map(|item| (self.entity_key(&item.cache_id()), item))
            .collect();
        self.cache.set_many(&entries, self.ttl()).await
    }

    // == Reads ==
    /// Cached entity, or the provider's answer cached for next time.
    pub async fn get_one(&self, id: &str) -> Result<Option<T>> {
        let key = self.entity_key(id);
        if let Some(item) = self.read_cached(&key).await {
            return Ok(Some(item));
        }

        let fetched = self.provider.get_one(id).await.map_err(provider_error)?;
        if let Some(item) = &fetched {
            self.warm("get_one", self.cache_one(item).await);
        }
        Ok(fetched)
    }

    /// Cached collection, or the provider's full listing cached for next time.
    pub async fn get_all(&self) -> Result<Vec<T>> {
        let key = self.registry().collection_key(self.domain);
        if let Some(items) = self.read_cached(&key).await {
            return Ok(items);
        }

        let items = self.provider.get_all().await.map_err(provider_error)?;
        self.warm("get_all", self.cache_many(&items).await);
        Ok(items)
    }

    /// Entities for `ids` in request order. Misses are fetched one by one
    /// and cached together; ids the provider does not know are skipped.
    pub async fn get_many<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<T>> {
        let mut found = Vec::with_capacity(ids.len());
        let mut fetched = Vec::new();

        for id in ids {
            let id = id.as_ref();
            match self.read_cached(&self.entity_key(id)).await {
                Some(item) => found.push(Some(item)),
                None => {
                    let item = self.provider.get_one(id).await.map_err(provider_error)?;
                    if item.is_some() {
                        fetched.push(found.len());
                    }
                    found.push(item);
                }
            }
        }

        if !fetched.is_empty() {
            let misses: Vec<(CacheKey, &T)> = fetched
                .iter()
                .filter_map(|&slot| found[slot].as_ref())
                .map(|item| (self.entity_key(&item.cache_id()), item))
                .collect();
            self.warm("get_many", self.cache.set_many(&misses, self.ttl()).await);
        }

        Ok(found.into_iter().flatten().collect())
    }

    // == Invalidation ==
    /// Cascading invalidation of each id, then the domain collection.
    /// Stops at the first failing id.
    pub async fn invalidate_many<S: AsRef<str>>(&self, ids: &[S]) -> Result<u64> {
        let removed = self.engine.invalidate_many(self.domain, ids).await?;
        let collection = self.registry().collection_key(self.domain);
        Ok(removed + self.cache.del(collection.as_str()).await?)
    }

    // == Helpers ==
    /// A cache read where every failure is a miss.
    async fn read_cached<V: DeserializeOwned>(&self, key: &CacheKey) -> Option<V> {
        match self.cache.get(key.as_str()).await {
            Ok(value) => value,
            Err(err) => {
                let err = CacheError::Warming(format!("read of '{}' failed: {}", key, err));
                warn!(domain = %self.domain, error = %err, "cache read failed, falling back to provider");
                None
            }
        }
    }

    /// Population is best effort: failures are logged and swallowed.
    fn warm(&self, operation: &str, result: Result<()>) {
        match result {
            Ok(()) => debug!(domain = %self.domain, operation, "cache populated"),
            Err(err) => {
                let err = CacheError::Warming(err.to_string());
                warn!(domain = %self.domain, operation, error = %err, "cache population failed");
            }
        }
    }
}

/// Keeps typed cache errors raised inside a provider (rate limiting) and
/// wraps everything else.
fn provider_error(err: anyhow::Error) -> CacheError {
    match err.downcast::<CacheError>() {
        Ok(err) => err,
        Err(err) => CacheError::Provider(err),
    }
}

//! Invalidation Engine
//!
//! Works out every key a change touches (the entity's own key plus the
//! collections of its one-hop dependents) and deletes them in one
//! MULTI/EXEC block: either every targeted key goes or none does.
//!
//! Deletion is atomic but not isolated. A reader racing the commit can
//! repopulate a key from stale source data; the next change invalidates it
//! again.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::{Transaction, TxOp};
use crate::cache::{finish, KeyedCache};
use crate::error::{CacheError, Result};
use crate::graph;
use crate::keys::{CacheKey, Domain, KeyRegistry};
use crate::retry::with_retry;

/// Bound on the caller-supplied mutate step of an atomic update.
pub const MUTATE_TIMEOUT: Duration = Duration::from_secs(5);

// == Invalidation Pattern ==
/// The computed blast radius of one change. Consumed by [`InvalidationEngine::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationPattern {
    pub domain: Domain,
    pub id: String,
    pub primary: CacheKey,
    pub related: Vec<CacheKey>,
    pub cascade: bool,
}

impl InvalidationPattern {
    /// Primary key first, then related keys, without duplicates.
    pub fn keys(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        std::iter::once(&self.primary)
            .chain(self.related.iter())
            .filter(|key| seen.insert(key.as_str()))
            .map(|key| key.as_str().to_string())
            .collect()
    }
}

// == Invalidation Engine ==
#[derive(Clone)]
pub struct InvalidationEngine {
    cache: KeyedCache,
    registry: KeyRegistry,
    mutate_timeout: Duration,
}

impl InvalidationEngine {
    pub fn new(cache: KeyedCache, registry: KeyRegistry) -> Self {
        Self {
            cache,
            registry,
            mutate_timeout: MUTATE_TIMEOUT,
        }
    }

    /// Overrides the mutate-step bound.
    pub fn with_mutate_timeout(mut self, timeout: Duration) -> Self {
        self.mutate_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    // == Related Keys ==
    /// Keys in `domain`'s direct dependents that embed entity `id`.
    pub async fn related_keys(&self, domain: Domain, id: &str) -> Result<Vec<CacheKey>> {
        self.keys_for(domain, id, graph::dependents(domain)).await
    }

    async fn keys_for(&self, domain: Domain, id: &str, dependents: &[Domain]) -> Result<Vec<CacheKey>> {
        let mut found = BTreeSet::new();
        for &dependent in dependents {
            let pattern = self.registry.related_pattern(dependent, domain, id);
            let matches = self.cache.keys(&pattern).await?;
            debug!(pattern = %pattern, matches = matches.len(), "related keys");
            found.extend(matches.into_iter().map(CacheKey::from_raw));
        }
        Ok(found.into_iter().collect())
    }

    // == Plan / Apply ==
    /// Builds the pattern for a change. Related keys are only looked up when cascading.
    pub async fn plan(&self, domain: Domain, id: &str, cascade: bool) -> Result<InvalidationPattern> {
        validate_id(id)?;
        let related = if cascade {
            self.related_keys(domain, id).await?
        } else {
            Vec::new()
        };

        Ok(InvalidationPattern {
            domain,
            id: id.to_string(),
            primary: self.registry.primary_key(domain, id),
            related,
            cascade,
        })
    }

    /// Deletes what `pattern` names. Returns the number of keys removed.
    pub async fn apply(&self, pattern: InvalidationPattern) -> Result<u64> {
        if !pattern.cascade {
            return self.cache.del(pattern.primary.as_str()).await;
        }
        self.atomic_update(&pattern.keys(), no_mutation).await
    }

    // == Invalidate ==
    /// Invalidates one entity, and with `cascade` every one-hop dependent
    /// collection embedding it.
    pub async fn invalidate(&self, domain: Domain, id: &str, cascade: bool) -> Result<u64> {
        let pattern = self.plan(domain, id, cascade).await?;
        let related = pattern.related.len();
        let removed = self.apply(pattern).await?;

        info!(
            domain = %domain,
            id = %id,
            cascade,
            related,
            removed,
            "cache invalidated"
        );
        Ok(removed)
    }

    /// Invalidates each id in turn, cascading. Stops at the first failure;
    /// ids before it stay invalidated, ids after it are not attempted.
    pub async fn invalidate_many<S: AsRef<str>>(&self, domain: Domain, ids: &[S]) -> Result<u64> {
        let mut total = 0;
        for id in ids {
            total += self.invalidate(domain, id.as_ref(), true).await?;
        }
        Ok(total)
    }

    /// Removes only the named dependents' collections for `id`, leaving the
    /// entity's own key and any other dependents alone.
    pub async fn invalidate_dependencies(&self, domain: Domain, id: &str, dependents: &[Domain]) -> Result<u64> {
        validate_id(id)?;
        let keys: Vec<String> = self
            .keys_for(domain, id, dependents)
            .await?
            .into_iter()
            .map(CacheKey::into_string)
            .collect();

        let removed = self.atomic_update(&keys, no_mutation).await?;
        info!(
            domain = %domain,
            id = %id,
            dependents = ?dependents,
            removed,
            "dependent caches invalidated"
        );
        Ok(removed)
    }

    // == Atomic Update ==
    /// Queues deletion of `keys`, runs `mutate` to queue further operations,
    /// then commits everything in one transaction.
    ///
    /// `mutate` is bounded by the engine's mutate timeout. If it times out or
    /// fails, the transaction is discarded and nothing is written.
    pub async fn atomic_update<F, Fut>(&self, keys: &[String], mutate: F) -> Result<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<TxOp>>>,
    {
        let mut tx = Transaction::new();
        for key in keys {
            tx.del(key.as_str());
        }

        let extra = match tokio::time::timeout(self.mutate_timeout, mutate()).await {
            Ok(Ok(ops)) => ops,
            Ok(Err(err)) => {
                warn!(queued = tx.len(), error = %err, "mutate step failed, transaction discarded");
                return Err(err);
            }
            Err(_) => {
                warn!(
                    queued = tx.len(),
                    timeout_ms = self.mutate_timeout.as_millis() as u64,
                    "mutate step timed out, transaction discarded"
                );
                return Err(CacheError::Operation(format!(
                    "atomic update timed out after {}ms",
                    self.mutate_timeout.as_millis()
                )));
            }
        };
        tx.extend(extra);

        if tx.is_empty() {
            return Ok(0);
        }

        let tx = &tx;
        let result = with_retry("exec", self.cache.retry_config(), || async move {
            let mut conn = self.cache.pool().acquire().await?;
            let result = conn.exec(tx.clone()).await;
            finish(conn, result)
        })
        .await;

        if let Err(err) = &result {
            warn!(queued = tx.len(), error = %err, "transaction failed and was discarded");
        }
        result
    }
}

fn no_mutation() -> std::future::Ready<Result<Vec<TxOp>>> {
    std::future::ready(Ok(Vec::new()))
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(CacheError::Validation("entity id must not be blank".to_string()));
    }
    Ok(())
}

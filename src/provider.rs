//! Data Provider Module
//!
//! The source-of-truth seam the cache falls back to on a miss. The cache
//! decides *when* to fetch; implementations decide *how*.

use std::sync::Arc;

use async_trait::async_trait;

use crate::rate_limit::{RateLimiter, RateLimiterConfig};

/// Fetch-by-id and fetch-all over the system of record.
#[async_trait]
pub trait DataProvider<T>: Send + Sync {
    async fn get_all(&self) -> anyhow::Result<Vec<T>>;

    /// `Ok(None)` when the entity does not exist.
    async fn get_one(&self, id: &str) -> anyhow::Result<Option<T>>;
}

#[async_trait]
impl<T, P> DataProvider<T> for Arc<P>
where
    T: Send + 'static,
    P: DataProvider<T> + ?Sized,
{
    async fn get_all(&self) -> anyhow::Result<Vec<T>> {
        (**self).get_all().await
    }

    async fn get_one(&self, id: &str) -> anyhow::Result<Option<T>> {
        (**self).get_one(id).await
    }
}

// == Rate Limited Provider ==
/// Takes one token per outbound call. An empty bucket fails the call with
/// [`CacheError::RateLimited`](crate::error::CacheError::RateLimited) wrapped
/// in the returned `anyhow::Error`.
pub struct RateLimitedProvider<P> {
    inner: P,
    limiter: Arc<RateLimiter>,
}

impl<P> RateLimitedProvider<P> {
    pub fn new(inner: P, config: RateLimiterConfig) -> Self {
        Self::with_limiter(inner, Arc::new(RateLimiter::new(config)))
    }

    /// Shares `limiter` with other providers hitting the same upstream.
    pub fn with_limiter(inner: P, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl<T, P> DataProvider<T> for RateLimitedProvider<P>
where
    T: Send + 'static,
    P: DataProvider<T>,
{
    async fn get_all(&self) -> anyhow::Result<Vec<T>> {
        self.limiter.try_acquire(1.0)?;
        self.inner.get_all().await
    }

    async fn get_one(&self, id: &str) -> anyhow::Result<Option<T>> {
        self.limiter.try_acquire(1.0)?;
        self.inner.get_one(id).await
    }
}

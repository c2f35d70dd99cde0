//! League Cache - caching and invalidation for sports data
//!
//! Read-through caching over a Redis-compatible store, with a dependency
//! graph that cascades invalidation to the collections embedding an entity,
//! atomic multi-key deletes, retry with backoff and a pooled backend.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod invalidation;
pub mod keys;
pub mod models;
pub mod pool;
pub mod provider;
pub mod rate_limit;
pub mod retry;
pub mod service;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheEntry, KeyedCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use invalidation::{InvalidationEngine, InvalidationPattern};
pub use keys::{CacheKey, Domain, KeyRegistry, TtlClass};
pub use pool::{ConnectionPool, PoolConfig};
pub use provider::{DataProvider, RateLimitedProvider};
pub use retry::{with_retry, RetryConfig};
pub use service::{Cacheable, DomainCache};
pub use tasks::spawn_cleanup_task;

//! Configuration Module
//!
//! Handles loading pool, retry, backend and server settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::pool::PoolConfig;
use crate::retry::RetryConfig;

/// Which store the connection pool opens connections against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process store, used for local runs and tests
    Memory,
    /// Redis-protocol server at `redis_url`
    Redis,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "redis" => Ok(BackendKind::Redis),
            other => Err(format!("unknown cache backend '{}'", other)),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backing store selection
    pub backend: BackendKind,
    /// Connection URL used when `backend` is Redis
    pub redis_url: String,
    /// Prefix prepended to every cache key (may be empty)
    pub key_prefix: String,
    /// Maximum number of pooled backend connections
    pub max_connections: usize,
    /// How long `acquire` waits for a free connection, in milliseconds
    pub acquire_timeout_ms: u64,
    /// Interval between availability checks while waiting, in milliseconds
    pub poll_interval_ms: u64,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,
    /// Per-attempt timeout in milliseconds
    pub operation_timeout_ms: u64,
    /// Capacity of the in-memory store
    pub memory_max_entries: usize,
    /// HTTP server port
    pub server_port: u16,
    /// Memory backend sweep interval in seconds
    pub cleanup_interval: u64,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - `memory` or `redis` (default: memory)
    /// - `REDIS_URL` - Redis connection URL (default: redis://127.0.0.1:6379)
    /// - `CACHE_PREFIX` - Key prefix (default: empty)
    /// - `POOL_MAX_CONNECTIONS` - Pool capacity (default: 10)
    /// - `POOL_ACQUIRE_TIMEOUT_MS` - Acquire timeout (default: 5000)
    /// - `POOL_POLL_INTERVAL_MS` - Acquire poll interval (default: 50)
    /// - `RETRY_MAX_RETRIES` - Retries per operation (default: 3)
    /// - `RETRY_BASE_DELAY_MS` - Base backoff (default: 100)
    /// - `RETRY_MAX_DELAY_MS` - Backoff ceiling (default: 2000)
    /// - `RETRY_TIMEOUT_MS` - Per-attempt timeout (default: 5000)
    /// - `MEMORY_MAX_ENTRIES` - Memory store capacity (default: 10000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: env_or("CACHE_BACKEND", defaults.backend),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: env::var("CACHE_PREFIX").unwrap_or(defaults.key_prefix),
            max_connections: env_or("POOL_MAX_CONNECTIONS", defaults.max_connections),
            acquire_timeout_ms: env_or("POOL_ACQUIRE_TIMEOUT_MS", defaults.acquire_timeout_ms),
            poll_interval_ms: env_or("POOL_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            max_retries: env_or("RETRY_MAX_RETRIES", defaults.max_retries),
            base_delay_ms: env_or("RETRY_BASE_DELAY_MS", defaults.base_delay_ms),
            max_delay_ms: env_or("RETRY_MAX_DELAY_MS", defaults.max_delay_ms),
            operation_timeout_ms: env_or("RETRY_TIMEOUT_MS", defaults.operation_timeout_ms),
            memory_max_entries: env_or("MEMORY_MAX_ENTRIES", defaults.memory_max_entries),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
        }
    }

    /// Pool settings derived from this configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// Retry settings derived from this configuration.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            timeout: Duration::from_millis(self.operation_timeout_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: String::new(),
            max_connections: 10,
            acquire_timeout_ms: 5000,
            poll_interval_ms: 50,
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            operation_timeout_ms: 5000,
            memory_max_entries: 10_000,
            server_port: 3000,
            cleanup_interval: 1,
        }
    }
}

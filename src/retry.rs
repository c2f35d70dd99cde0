//! Retry/Recovery Wrapper
//!
//! Runs a cache operation under a per-attempt timeout, retries connection and
//! operation failures with capped exponential backoff, and hands the last
//! error back once retries are exhausted.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{CacheError, Result};

// == Retry Config ==
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts are `max_retries + 1`
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Bound on each individual attempt
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            timeout: Duration::from_millis(5000),
        }
    }
}

impl RetryConfig {
    /// Delay before retry `n` (1-based): `min(base * 2^(n-1), max)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

// == Retry State ==
/// Bookkeeping for one logical operation; never outlives the call.
#[derive(Debug, Default)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<CacheError>,
}

// == With Retry ==
/// Runs `op` until it succeeds, fails with a non-retryable error, or has
/// been attempted `max_retries + 1` times.
///
/// An attempt that exceeds `config.timeout` counts as a connection failure.
pub async fn with_retry<T, F, Fut>(operation: &str, config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let timeout_ms = config.timeout.as_millis() as u64;
    let mut state = RetryState::default();

    loop {
        state.attempt += 1;

        let outcome = match tokio::time::timeout(config.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Connection(format!(
                "{} timed out after {}ms",
                operation, timeout_ms
            ))),
        };

        let err = match outcome {
            Ok(value) => {
                if state.attempt > 1 {
                    info!(
                        operation,
                        attempts = state.attempt,
                        "cache operation recovered after retry"
                    );
                } else {
                    debug!(operation, "cache operation succeeded");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(operation, kind = err.kind(), error = %err, "non-retryable cache error");
            return Err(err);
        }

        if state.attempt > config.max_retries {
            error!(
                operation,
                attempts = state.attempt,
                timeout_ms,
                kind = err.kind(),
                error = %err,
                previous_error = ?state.last_error.as_ref().map(ToString::to_string),
                "cache operation failed after exhausting retries"
            );
            return Err(err);
        }

        let delay = config.backoff(state.attempt);
        warn!(
            operation,
            attempt = state.attempt,
            delay_ms = delay.as_millis() as u64,
            timeout_ms,
            kind = err.kind(),
            error = %err,
            "cache operation failed, retrying"
        );
        state.last_error = Some(err);
        tokio::time::sleep(delay).await;
    }
}

//! Rate Limiter Module
//!
//! Token bucket guarding outbound loader calls made while populating the
//! cache. The bucket never suspends: a call either takes a token or fails
//! fast with [`CacheError::RateLimited`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CacheError, Result};

// == Config ==
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    /// Maximum tokens the bucket holds
    pub capacity: f64,
    /// Tokens added per whole elapsed interval
    pub tokens_per_interval: f64,
    pub interval: Duration,
}

impl RateLimiterConfig {
    fn interval_ms(&self) -> i64 {
        (self.interval.as_millis() as i64).max(1)
    }
}

// == State ==
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterState {
    pub tokens: f64,
    /// Start of the current, not yet credited, interval (Unix milliseconds)
    pub last_refill_ms: i64,
    pub config: RateLimiterConfig,
}

impl RateLimiterState {
    /// A full bucket whose first interval starts at `now_ms`.
    pub fn full(config: RateLimiterConfig, now_ms: i64) -> Self {
        Self {
            tokens: config.capacity,
            last_refill_ms: now_ms,
            config,
        }
    }

    /// Milliseconds until the next interval boundary credits tokens.
    pub fn next_refill_in_ms(&self, now_ms: i64) -> u64 {
        let interval = self.config.interval_ms();
        let elapsed = (now_ms - self.last_refill_ms).max(0);
        (interval - elapsed % interval) as u64
    }
}

/// Result of [`try_consume`]; both arms carry the refilled state.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    Granted(RateLimiterState),
    Denied(RateLimiterState),
}

// == Refill ==
/// Credits every whole interval elapsed since `last_refill_ms`.
///
/// `last_refill_ms` advances by the intervals credited, not to `now_ms`, so
/// partial intervals carry over instead of being lost.
pub fn refill(state: RateLimiterState, now_ms: i64) -> RateLimiterState {
    let interval = state.config.interval_ms();
    let elapsed = now_ms - state.last_refill_ms;
    if elapsed < interval {
        return state;
    }

    let intervals = elapsed / interval;
    let tokens = (state.tokens + intervals as f64 * state.config.tokens_per_interval)
        .min(state.config.capacity);

    RateLimiterState {
        tokens,
        last_refill_ms: state.last_refill_ms + intervals * interval,
        config: state.config,
    }
}

// == Try Consume ==
/// Refills, then takes `n` tokens if available.
pub fn try_consume(n: f64, state: RateLimiterState, now_ms: i64) -> ConsumeOutcome {
    let state = refill(state, now_ms);
    if state.tokens >= n {
        ConsumeOutcome::Granted(RateLimiterState {
            tokens: state.tokens - n,
            ..state
        })
    } else {
        ConsumeOutcome::Denied(state)
    }
}

// == Rate Limiter ==
/// Thread-safe bucket around [`RateLimiterState`].
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<RateLimiterState>,
}

impl RateLimiter {
    /// Starts with a full bucket.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::from_state(RateLimiterState::full(config, Utc::now().timestamp_millis()))
    }

    pub fn from_state(state: RateLimiterState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Takes `n` tokens now or fails with `RateLimited`.
    pub fn try_acquire(&self, n: f64) -> Result<()> {
        self.try_acquire_at(n, Utc::now().timestamp_millis())
    }

    /// [`try_acquire`](Self::try_acquire) against an explicit clock reading.
    pub fn try_acquire_at(&self, n: f64, now_ms: i64) -> Result<()> {
        let mut guard = self.state.lock();
        match try_consume(n, guard.clone(), now_ms) {
            ConsumeOutcome::Granted(next) => {
                *guard = next;
                Ok(())
            }
            ConsumeOutcome::Denied(next) => {
                let remaining_tokens = next.tokens;
                let retry_after_ms = next.next_refill_in_ms(now_ms);
                *guard = next;
                debug!(remaining_tokens, retry_after_ms, "rate limit reached");
                Err(CacheError::RateLimited {
                    remaining_tokens,
                    retry_after_ms,
                })
            }
        }
    }

    /// Snapshot of the current bucket.
    pub fn state(&self) -> RateLimiterState {
        self.state.lock().clone()
    }
}

// == With Rate Limit ==
/// An async function gated by a token bucket.
pub struct RateLimited<F> {
    inner: F,
    limiter: Arc<RateLimiter>,
}

impl<F> RateLimited<F> {
    /// Takes one token, then delegates to the wrapped function.
    pub async fn call<A, T, Fut>(&self, arg: A) -> Result<T>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.limiter.try_acquire(1.0)?;
        (self.inner)(arg).await
    }
}

/// Wraps `f` so every invocation first consumes a token from a bucket
/// seeded with `initial`. Returns the wrapper and a handle for inspecting
/// the bucket.
pub fn with_rate_limit<F>(f: F, initial: RateLimiterState) -> (RateLimited<F>, Arc<RateLimiter>) {
    let limiter = Arc::new(RateLimiter::from_state(initial));
    (
        RateLimited {
            inner: f,
            limiter: limiter.clone(),
        },
        limiter,
    )
}

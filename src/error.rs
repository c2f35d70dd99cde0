//! Error types for the cache layer
//!
//! Every component returns a typed [`CacheError`]; the retry wrapper is the
//! only place that decides between retrying and escalating.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Bad key or TTL. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backend unreachable, pool exhausted or timed out.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serialization, transaction or backend command failure.
    #[error("Operation error: {0}")]
    Operation(String),

    /// Best-effort cache population failed.
    #[error("Cache warming error: {0}")]
    Warming(String),

    /// The token bucket had no permit for this call.
    #[error("Rate limited: {remaining_tokens} tokens left, next refill in {retry_after_ms}ms")]
    RateLimited {
        remaining_tokens: f64,
        retry_after_ms: u64,
    },

    /// Failure reported by the system of record or external provider.
    #[error("Data provider error: {0}")]
    Provider(#[source] anyhow::Error),
}

impl CacheError {
    // == Classification ==
    /// Returns true for failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::Connection(_) | CacheError::Operation(_))
    }

    /// Short stable label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::Validation(_) => "validation",
            CacheError::Connection(_) => "connection",
            CacheError::Operation(_) => "operation",
            CacheError::Warming(_) => "warming",
            CacheError::RateLimited { .. } => "rate_limited",
            CacheError::Provider(_) => "provider",
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            CacheError::Connection(err.to_string())
        } else {
            CacheError::Operation(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Operation(format!("serialization failed: {}", err))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Validation(_) => StatusCode::BAD_REQUEST,
            CacheError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            CacheError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Operation(_) | CacheError::Warming(_) | CacheError::Provider(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;

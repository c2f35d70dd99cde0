//! Cache Module
//!
//! Typed access to the backing store: the `{value, timestamp}` envelope and
//! the pooled, retried keyed cache built on it.

mod envelope;
mod keyed;

// Re-export public types
pub use envelope::{decode, encode, CacheEntry};
pub use keyed::KeyedCache;

pub(crate) use keyed::finish;

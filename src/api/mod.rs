//! API Module
//!
//! Operational HTTP surface over the cache layer.
//!
//! # Endpoints
//! - `GET /health` - Round-trip write against the backend (200 or 503)
//! - `GET /stats` - Pool occupancy and memory-store counters
//! - `POST /invalidate/:domain/:id?cascade=bool` - Manual invalidation

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;

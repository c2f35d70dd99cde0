//! Background Tasks Module
//!
//! - Expiry sweep: removes expired entries from the memory backend's store

mod cleanup;

pub use cleanup::spawn_cleanup_task;

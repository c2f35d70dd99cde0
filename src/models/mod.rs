//! Request and response models for the operational HTTP surface

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::InvalidateQuery;
pub use responses::{HealthResponse, InvalidateResponse, StatsResponse};

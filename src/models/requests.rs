//! Request DTOs for the operational API

use serde::Deserialize;

/// Query string of `POST /invalidate/:domain/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateQuery {
    /// Also remove dependent collections (default true)
    #[serde(default = "default_cascade")]
    pub cascade: bool,
}

impl Default for InvalidateQuery {
    fn default() -> Self {
        Self {
            cascade: default_cascade(),
        }
    }
}

fn default_cascade() -> bool {
    true
}

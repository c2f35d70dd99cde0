//! Response DTOs for the operational API

use serde::Serialize;

use crate::backend::memory::StoreStats;
use crate::keys::Domain;
use crate::pool::PoolStatus;

/// Response body for `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,
    /// Backend the pool connects to
    pub backend: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(healthy: bool, backend: &str) -> Self {
        Self {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            backend: backend.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Response body for `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub backend: String,
    pub pool: PoolStatus,
    /// Present only when running on the memory backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreStatsBody>,
}

/// Memory store counters plus the derived hit rate.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatsBody {
    #[serde(flatten)]
    pub stats: StoreStats,
    /// hits / (hits + misses)
    pub hit_rate: f64,
}

impl From<StoreStats> for StoreStatsBody {
    fn from(stats: StoreStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for `POST /invalidate/:domain/:id`
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub domain: Domain,
    pub id: String,
    pub cascade: bool,
    /// Keys actually deleted
    pub removed: u64,
}

//! API Handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::backend::{ConnectionFactory, MemoryBackend, RedisConnector};
use crate::cache::KeyedCache;
use crate::config::{BackendKind, Config};
use crate::error::Result;
use crate::invalidation::InvalidationEngine;
use crate::keys::{Domain, KeyRegistry};
use crate::models::{HealthResponse, InvalidateQuery, InvalidateResponse, StatsResponse};
use crate::pool::ConnectionPool;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: KeyedCache,
    pub engine: InvalidationEngine,
    /// Set when running on the in-process backend, for stats and the sweeper
    pub memory: Option<MemoryBackend>,
}

impl AppState {
    pub fn new(cache: KeyedCache, engine: InvalidationEngine) -> Self {
        Self {
            cache,
            engine,
            memory: None,
        }
    }

    pub fn with_memory(mut self, backend: MemoryBackend) -> Self {
        self.memory = Some(backend);
        self
    }

    /// Builds the backend, pool, cache and engine described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let (factory, memory): (Arc<dyn ConnectionFactory>, Option<MemoryBackend>) = match config.backend {
            BackendKind::Memory => {
                let backend = MemoryBackend::new(config.memory_max_entries);
                (Arc::new(backend.clone()), Some(backend))
            }
            BackendKind::Redis => (Arc::new(RedisConnector::new(&config.redis_url)?), None),
        };

        let pool = ConnectionPool::new(factory, config.pool_config());
        let cache = KeyedCache::new(pool, config.retry_config());
        let engine = InvalidationEngine::new(cache.clone(), KeyRegistry::new(config.key_prefix.clone()));

        Ok(Self {
            cache,
            engine,
            memory,
        })
    }

    pub fn pool(&self) -> &ConnectionPool {
        self.cache.pool()
    }
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let key = state.engine.registry().health_key();
    let healthy = state.cache.check_health(key.as_str()).await;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(HealthResponse::new(healthy, state.pool().backend_name())))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let store = match &state.memory {
        Some(backend) => Some(backend.stats().await.into()),
        None => None,
    };

    Json(StatsResponse {
        backend: state.pool().backend_name().to_string(),
        pool: state.pool().status(),
        store,
    })
}

/// Handler for POST /invalidate/:domain/:id
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path((domain, id)): Path<(String, String)>,
    Query(query): Query<InvalidateQuery>,
) -> Result<Json<InvalidateResponse>> {
    let domain: Domain = domain.parse()?;
    let removed = state.engine.invalidate(domain, &id, query.cascade).await?;

    info!(domain = %domain, id = %id, removed, "manual invalidation");
    Ok(Json(InvalidateResponse {
        domain,
        id,
        cascade: query.cascade,
        removed,
    }))
}

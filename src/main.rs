//! League Cache - operational server
//!
//! Serves health, pool statistics and manual invalidation over the cache
//! layer configured from the environment.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use league_cache::api::{create_router, AppState};
use league_cache::config::Config;
use league_cache::pool::ConnectionPool;
use league_cache::tasks::spawn_cleanup_task;

/// # Startup Sequence
/// 1. Initialize tracing
/// 2. Load configuration from environment variables
/// 3. Build backend, connection pool, cache and invalidation engine
/// 4. Start the expiry sweep when running on the memory backend
/// 5. Serve until SIGINT/SIGTERM, then shut the pool down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "league_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting League Cache server");

    let config = Config::from_env();
    info!(
        backend = ?config.backend,
        max_connections = config.max_connections,
        max_retries = config.max_retries,
        port = config.server_port,
        "configuration loaded"
    );

    let state = AppState::from_config(&config).context("failed to build cache layer")?;
    let pool = state.pool().clone();
    info!(backend = pool.backend_name(), "cache layer initialized");

    let sweeper = state
        .memory
        .as_ref()
        .map(|backend| spawn_cleanup_task(backend.store(), config.cleanup_interval));

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(pool, sweeper))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then stops the sweeper and drains the pool.
async fn shutdown_signal(pool: ConnectionPool, sweeper: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = sweeper {
        handle.abort();
        warn!("Expiry sweep aborted");
    }
    pool.shutdown().await;
    info!(status = ?pool.status(), "connection pool closed");
}

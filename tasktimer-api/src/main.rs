//! # Tasktimer API Server
//!
//! Serves the task tracker over HTTP/JSON.
//!
//! ## Start-up
//!
//! 1. Load configuration from `.env` and the environment
//! 2. Construct the storage adapter selected by `STORAGE_BACKEND`
//!    (PostgreSQL runs pending migrations first)
//! 3. Build the tracker, timer registry and router
//! 4. Serve until Ctrl-C or SIGTERM, then stop every timer (saving its value)
//!
//! ## Usage
//!
//! ```bash
//! STORAGE_BACKEND=local cargo run -p tasktimer-api
//! ```

use std::sync::Arc;
use tasktimer_api::app::{build_router, AppState};
use tasktimer_api::config::{Config, StorageBackend};
use tasktimer_shared::db::{migrations, pool};
use tasktimer_shared::storage::blob::FileBlobStore;
use tasktimer_shared::storage::local::LocalStore;
use tasktimer_shared::storage::postgres::PostgresStore;
use tasktimer_shared::storage::StorageAdapter;
use tasktimer_shared::tracker::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tasktimer_api=debug,tasktimer_shared=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!(
        "Tasktimer API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let (store, pg_pool) = match config.storage.backend {
        StorageBackend::Postgres => {
            let database = config
                .storage
                .database
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("postgres backend selected without database settings"))?;

            migrations::ensure_database_exists(&database.url).await?;

            let db = pool::create_pool(pool::DatabaseConfig {
                max_connections: database.max_connections,
                ..pool::DatabaseConfig::from_url(database.url.clone())
            })
            .await?;
            migrations::run_migrations(&db).await?;

            let store: Arc<dyn StorageAdapter> = Arc::new(PostgresStore::new(db.clone()));
            (store, Some(db))
        }
        StorageBackend::Local => {
            let local = &config.storage.local;
            tracing::info!(dir = %local.dir.display(), "Using local JSON storage");

            let store: Arc<dyn StorageAdapter> = Arc::new(LocalStore::new(
                FileBlobStore::new(local.dir.clone()),
                local.keys.clone(),
            ));
            (store, None)
        }
    };

    let tracker = TaskTracker::new(store);
    let bind_address = config.bind_address();
    let state = AppState::new(tracker, config)?;

    if state.auth.is_none() {
        tracing::warn!("AUTH_JWT_SECRET not set, all requests act as the anonymous user");
    }

    let timers = state.timers.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    timers.shutdown().await;
    if let Some(db) = pg_pool {
        pool::close_pool(db).await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining...");
}

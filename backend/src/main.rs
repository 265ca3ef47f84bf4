//! Subscriptions Backend
//!
//! A REST API for managing services and user subscriptions, persisted in
//! PostgreSQL. Runs until SIGINT/SIGTERM, then drains in-flight requests and
//! closes the database connection, each within a bounded grace period.

use anyhow::Context;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use subscriptions_backend::{
    api,
    config::{self, Config, StorageConfig},
    logging,
    repository::{MemoryRepository, PgRepository, Repository},
    state::AppState,
};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Time in-flight requests get to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Seed the environment before reading it; report the outcome once logging is up
    let config_file = config::load_config_file(config::CONFIG_FILE);

    let config = Config::from_env().context("failed to load configuration")?;
    let _log_guards = logging::init(&config.log).context("failed to initialize logger")?;

    match config_file {
        Ok(path) => info!(path = %path.display(), "Loaded configuration file"),
        Err(e) => warn!(error = %e, "failed to load configuration file"),
    }
    info!("Configuration loaded: {:?}", config);

    let repository: Arc<dyn Repository> = match &config.storage {
        StorageConfig::Postgres(db) => {
            let repo = PgRepository::connect(db).await.inspect_err(|e| {
                error!(error = %e, "failed to connect repository");
            })?;

            match repo.migrate(&db.migrations_path).await {
                Ok(()) => info!("migration completed successfully"),
                Err(e) => error!(
                    error = %e,
                    path = %db.migrations_path.display(),
                    "migration failed"
                ),
            }
            Arc::new(repo)
        }
        StorageConfig::Memory => {
            warn!("Using in-memory storage, data will be lost on exit");
            Arc::new(MemoryRepository::new())
        }
    };

    let state = AppState::new(repository.clone(), config.server.app_name.clone());
    let app = api::router(state, config.server.write_timeout);

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.addr))?;

    info!(
        app = %config.server.app_name,
        version = env!("CARGO_PKG_VERSION"),
        "server start (bind address: {})",
        config.server.addr
    );

    let served = serve(listener, app).await;
    if let Err(e) = &served {
        error!(error = %e, "server error");
    }

    repository.close().await;
    info!("Server shutdown complete");
    served
}

/// Serve until a shutdown signal, then drain for at most [`SHUTDOWN_GRACE`]
async fn serve(listener: tokio::net::TcpListener, app: axum::Router) -> anyhow::Result<()> {
    let draining = Arc::new(Notify::new());

    let signal = {
        let draining = draining.clone();
        async move {
            shutdown_signal().await;
            draining.notify_one();
        }
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .into_future();

    let deadline = async {
        draining.notified().await;
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    };

    tokio::select! {
        result = server => result.context("failed to serve")?,
        _ = deadline => warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "shutdown grace period elapsed, dropping in-flight requests"
        ),
    }

    info!("server shutdown");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

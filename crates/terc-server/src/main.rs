//! Terceirizados Server - Main entry point

use anyhow::Result;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use terc_common::logging::{init_logging, LogConfig};
use terc_common::storage::{connect, StorageConfig};
use tokio::signal;
use tracing::info;

use terc_server::{create_router, AppState, ServerConfig, SnapshotLoader};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("terc-server")
        .filter_directives("terc_server=debug,tower_http=debug,axum=info")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting Terceirizados API");

    let config = ServerConfig::from_env()?;
    info!(
        "Configuration loaded - server will bind to {}",
        config.bind_address()
    );

    let store = connect(StorageConfig::from_env()?).await?;
    info!("Storage client initialized");

    let snapshot = Arc::new(SnapshotLoader::new(store, &config.snapshot_path));
    let outcome = snapshot.load().await?;
    info!(outcome = ?outcome, "Snapshot ready at {}", config.snapshot_path.display());

    let app = create_router(AppState { snapshot });

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give ongoing requests time to complete
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}

//! Ingest Server - Signed webhook receiver with exactly-once storage.
//!
//! This binary:
//! - Receives signed message webhooks and stores each message once
//! - Serves paginated message listings and aggregate stats
//! - Exposes liveness, readiness and Prometheus-style metrics
//!
//! Configuration is read once from the environment at startup.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ingest::{router, AppState, Config, MessageStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env();

    // Initialize structured JSON logging; RUST_LOG overrides LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("ingest_server_starting");

    info!(
        app_name = %config.app_name,
        env = %config.env,
        port = config.port,
        database_url = %config.database_url,
        webhook_secret_configured = config.has_webhook_secret(),
        log_level = %config.log_level,
        "config_loaded"
    );

    // Open the message store (creates the schema on first start)
    let store = MessageStore::connect(&config.database_url)
        .await
        .context("Failed to open message store")?;

    let port = config.port;
    let state = AppState::new(config, store.clone());
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "ingest_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    store.close().await;

    info!("ingest_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("ingest_server_shutting_down");
}

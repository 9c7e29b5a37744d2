//! Proof Guard sidecar
//!
//! Serves the guard components over HTTP: request authentication with replay
//! protection, signed responses and statistics.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proof_guard::{create_router, AppState, Config};

/// Main entry point for the guard sidecar.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Build the ledger, verifier, cache and signer
/// 4. Start the sweep, prune and rotation timers
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Stop timers on SIGINT/SIGTERM and shut down gracefully
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proof_guard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Proof Guard sidecar");

    // Load configuration from environment variables
    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        "Configuration loaded: port={}, nonce_ttl={:?}, strict_ordering={}, cache_max_items={}, rotation={:?}",
        config.server_port,
        config.nonce.ttl,
        config.nonce.strict_ordering,
        config.cache.max_items,
        config.signer.rotation_interval
    );

    let state = AppState::from_config(&config).context("failed to build guard components")?;
    state.start_background_tasks().await;
    info!("Background tasks started");

    // Create router with all endpoints
    let app = create_router(state.clone());

    // Bind to configured port
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, stops every background timer and allows graceful shutdown.
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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

    state.shutdown().await;
    warn!("Background tasks stopped");
}

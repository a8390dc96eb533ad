//! Server initialization
//!
//! Contains the main `run()` function that starts all server components.

use super::loader::load_config;
use super::services::Services;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the server
pub async fn run() -> Result<()> {
    info!(
        "Starting Sensemaker v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_config()?;
    info!(members = config.members.len(), "Configuration loaded");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let services = Arc::new(Services::from_config(config).await?);
    let shutdown = CancellationToken::new();

    let queue_task = {
        let queue = services.queue.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.run(token).await {
                error!("Job queue error: {}", e);
            }
        })
    };
    info!(
        frequency_hz = services.config.queue.frequency_hz,
        "Job queue started"
    );

    let worker_task = {
        let worker = services.worker.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { worker.run(token).await })
    };
    info!("Background worker started");

    let app = crate::api::router(services.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on http://{}", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .context("HTTP server error")?;

    shutdown.cancel();
    drain("queue", queue_task).await;
    drain("worker", worker_task).await;

    info!("Sensemaker shutdown complete");
    Ok(())
}

async fn drain(name: &str, task: JoinHandle<()>) {
    match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(task = %name, "Background task panicked: {}", e),
        Err(_) => warn!(task = %name, "Background task did not stop in time"),
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

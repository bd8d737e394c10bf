mod config;
mod error;
mod models;
mod routes;
mod services;
mod state;

use crate::config::AppConfig;
use crate::services::remote::RemoteStore;
use crate::services::scheduler::AdminScheduler;
use crate::state::AppState;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!("Starting radio admin server on port {}", config.port);

    let cancel = CancellationToken::new();
    let tasks = TaskTracker::new();

    // Remote replication is optional; an unreachable bucket disables it for
    // this run instead of blocking startup.
    let remote = match &config.remote {
        Some(rc) => match RemoteStore::connect(rc, config.operation_timeout).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!("Remote replication disabled: {}", e);
                None
            }
        },
        None => None,
    };

    // Build application state (creates the backup directory)
    let state = Arc::new(AppState::new(
        config.clone(),
        tasks.clone(),
        cancel.clone(),
        remote,
    )?);

    routes::init_start_time();

    // Initialize cron scheduler
    let scheduler = match AdminScheduler::new(state.clone()).await {
        Ok(s) => {
            if let Err(e) = s.init_schedules().await {
                tracing::warn!("Failed to initialize schedules: {}", e);
            }
            if let Err(e) = s.start().await {
                tracing::warn!("Failed to start scheduler: {}", e);
            }
            Some(s)
        }
        Err(e) => {
            tracing::warn!("Failed to create scheduler: {}", e);
            None
        }
    };

    // Build router
    let app = routes::create_router(state.clone());

    // Start HTTP server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");

    // Stop scheduling new triggers first
    if let Some(s) = scheduler {
        if let Err(e) = s.shutdown().await {
            tracing::warn!("Scheduler shutdown error: {}", e);
        }
    }

    // Wait for in-flight work (dump, replication, remote deletes). A second
    // interrupt cancels running subprocesses instead of waiting them out.
    let force_quit = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                tracing::warn!("Second interrupt received, cancelling in-flight jobs");
                cancel.cancel();
            }
        }
    });

    tasks.close();
    tasks.wait().await;
    force_quit.abort();

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

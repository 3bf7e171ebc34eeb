use std::net::SocketAddr;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{error, info, warn};

use super::{
    services::{fail_job, finish_job, health, init_job, job_status, process_chunk},
    state::{AnyError, AppState},
};
use crate::config::Config;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs/{job_id}/init", post(init_job))
        .route("/jobs/{job_id}/chunks", post(process_chunk))
        .route("/jobs/{job_id}/finish", post(finish_job))
        .route("/jobs/{job_id}/fail", post(fail_job))
        .route("/jobs/{job_id}/status", get(job_status))
        .route("/health", get(health))
        .with_state(state)
        // Content-Encoding is handled here, handlers see plain JSON
        .layer(RequestDecompressionLayer::new())
}

/// Serve the job API until Ctrl-C or SIGTERM, then wait for in-flight
/// single-stream copies before returning
pub async fn run(address: SocketAddr, config: Config) -> Result<(), AnyError> {
    let state = AppState::from_config(config)?;
    let tasks = state.tasks().clone();
    let ledger = state.ledger().clone();

    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "IngestBox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tasks.close();
    if !tasks.is_empty() {
        info!(pending = tasks.len(), "Waiting for single-stream transfers");
    }
    tasks.wait().await;

    if let Err(e) = ledger.persist() {
        warn!(error = %e, "Failed to persist ledger on shutdown");
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}

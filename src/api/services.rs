use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{
    error::ApiError,
    models::{ChunkRequest, FailRequest, HealthResponse, InitRequest},
    state::AppState,
    utils::decode_json,
    validation::{validate_chunk, validate_fail, validate_init, validate_job_id},
};
use crate::transfer::{ChunkRange, JobService};

/// Start or restart a job (POST /jobs/{job_id}/init)
///
/// Probes the source, plans the transfer and either opens a multipart upload
/// (parallel) or launches the single-stream copy in the background. Calling
/// it again while that copy runs reports `already_running` instead of
/// starting a second one.
pub async fn init_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    validate_job_id(&job_id)?;
    let request: InitRequest = decode_json(&headers, &body)?;
    validate_init(&request)?;

    let actor = state.registry.actor(&job_id).await;
    let result = actor.init(&request.source_url, &request.filename).await;
    drop(actor);
    state.registry.release(&job_id).await;
    let outcome = result?;

    info!(
        job_id = %job_id,
        mode = ?outcome.mode,
        total_size = outcome.total_size,
        parts = outcome.ranges.len(),
        already_running = outcome.already_running,
        "Init handled"
    );
    Ok((StatusCode::OK, Json(outcome)))
}

/// Copy one byte range into its part (POST /jobs/{job_id}/chunks)
pub async fn process_chunk(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    validate_job_id(&job_id)?;
    let request: ChunkRequest = decode_json(&headers, &body)?;
    validate_chunk(&request)?;

    let actor = state.registry.actor(&job_id).await;
    let result = actor
        .process_chunk(ChunkRange {
            part_number: request.part_number,
            start: request.start,
            end: request.end,
        })
        .await;
    drop(actor);
    state.registry.release(&job_id).await;
    let outcome = result?;

    debug!(
        job_id = %job_id,
        part_number = outcome.part_number,
        bytes = outcome.bytes,
        elapsed_ms = outcome.elapsed_ms,
        "Chunk handled"
    );
    Ok((StatusCode::OK, Json(outcome)))
}

/// Complete the multipart upload from the recorded parts (POST /jobs/{job_id}/finish)
pub async fn finish_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_job_id(&job_id)?;

    let actor = state.registry.actor(&job_id).await;
    let result = actor.finish().await;
    drop(actor);
    state.registry.release(&job_id).await;
    let outcome = result?;

    Ok((StatusCode::OK, Json(outcome)))
}

/// Record a client-side failure and abort the upload (POST /jobs/{job_id}/fail)
pub async fn fail_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    validate_job_id(&job_id)?;
    let request: FailRequest = decode_json(&headers, &body)?;
    validate_fail(&request)?;

    let actor = state.registry.actor(&job_id).await;
    let result = actor.mark_failed(&request.reason).await;
    drop(actor);
    state.registry.release(&job_id).await;
    result?;

    Ok(StatusCode::NO_CONTENT)
}

/// Current job state (GET /jobs/{job_id}/status)
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_job_id(&job_id)?;

    let actor = state.registry.actor(&job_id).await;
    let result = actor.status().await;
    drop(actor);
    state.registry.release(&job_id).await;
    let report = result?;

    Ok((StatusCode::OK, Json(report)))
}

/// Health check endpoint (GET /health)
///
/// Returns 503 when the ledger cannot be read; counters come from the
/// shared `Metrics`.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let ledger_healthy = match state.ledger().stats() {
        Ok(stats) => {
            components.insert("ledger".to_string(), "healthy".to_string());
            components.insert("ledger_jobs".to_string(), stats.job_count.to_string());
            true
        }
        Err(e) => {
            components.insert("ledger".to_string(), format!("unhealthy: {e}"));
            false
        }
    };

    components.insert(
        "storage".to_string(),
        format!("{:?}", state.config.storage.provider).to_lowercase(),
    );
    components.insert(
        "live_jobs".to_string(),
        state.registry.live_count().await.to_string(),
    );
    components.insert(
        "background_transfers".to_string(),
        state.tasks().len().to_string(),
    );

    let (status_code, overall_status) = if ledger_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}

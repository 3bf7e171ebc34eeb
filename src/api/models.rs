//! Request and response bodies of the job API.
//!
//! Success bodies for init, chunk and finish are the transfer outcomes
//! themselves (`InitOutcome`, `ChunkOutcome`, `FinishOutcome`); status returns
//! `JobStatusReport`. Every failure is an [`ErrorResponse`]:
//!
//! ```json
//! { "code": "NO_PARTS", "message": "no parts recorded for job 42" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::observability::MetricsSnapshot;

/// `POST /jobs/{job_id}/init`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitRequest {
    pub source_url: String,
    pub filename: String,
}

/// `POST /jobs/{job_id}/chunks`, with inclusive byte offsets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub part_number: u32,
    pub start: u64,
    pub end: u64,
}

/// `POST /jobs/{job_id}/fail`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub metrics: MetricsSnapshot,
}

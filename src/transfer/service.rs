use async_trait::async_trait;

use super::error::Result;
use super::types::{ChunkOutcome, ChunkRange, FinishOutcome, InitOutcome, JobStatusReport};

/// Operations on one job, as seen by a chunk driver
///
/// Implemented in-process by `JobActor` and over HTTP by `RemoteJob`.
#[async_trait]
pub trait JobService: Send + Sync {
    fn job_id(&self) -> &str;

    /// Probe the source, pick a mode and open the transfer
    async fn init(&self, source_url: &str, filename: &str) -> Result<InitOutcome>;

    /// Fetch one range and upload it as a part. Safe to repeat.
    async fn process_chunk(&self, range: ChunkRange) -> Result<ChunkOutcome>;

    /// Complete the multipart upload from the recorded parts
    async fn finish(&self) -> Result<FinishOutcome>;

    async fn status(&self) -> Result<JobStatusReport>;

    /// Record an unrecoverable failure, keeping state for inspection
    async fn mark_failed(&self, reason: &str) -> Result<()>;
}

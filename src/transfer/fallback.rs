//! Whole-body copy for sources that cannot be split into ranges

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::humanize;
use crate::source::{SourceClient, response_length};
use crate::storage::{StorageClient, StorageError};

use super::actor::ProgressSink;
use super::error::{Result, TransferError};
use super::types::Progress;

/// Everything the copy needs, detached from the request that started it
#[derive(Debug, Clone)]
pub struct FallbackJob {
    pub job_id: String,
    pub source_url: String,
    pub object_key: String,
    pub content_type: Option<String>,
    pub progress: Progress,
}

/// Lets a snapshot through at most once per interval
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Instant,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn ready(&mut self) -> bool {
        if self.last.elapsed() >= self.interval {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}

/// Copy the source into the store, publishing progress through `sink`.
///
/// The terminal state is always persisted, whatever happened mid-stream.
pub async fn run(
    job: FallbackJob,
    source: SourceClient,
    storage: StorageClient,
    sink: ProgressSink,
    interval: Duration,
) {
    let started = Instant::now();
    let mut progress = job.progress.clone();

    match copy(&job, &source, &storage, &sink, &mut progress, interval).await {
        Ok(()) => {
            progress.complete();
            info!(
                job_id = %job.job_id,
                object_key = %job.object_key,
                bytes = progress.downloaded,
                rate = %humanize::rate(progress.downloaded, started.elapsed()),
                "Single-stream transfer completed"
            );
        }
        Err(e) => {
            progress.fail(e.to_string());
            warn!(job_id = %job.job_id, error = %e, "Single-stream transfer failed");
        }
    }

    if let Err(e) = sink.record(&progress).await {
        error!(job_id = %sink.job_id(), error = %e, "Failed to persist final progress");
    }
}

async fn copy(
    job: &FallbackJob,
    source: &SourceClient,
    storage: &StorageClient,
    sink: &ProgressSink,
    progress: &mut Progress,
    interval: Duration,
) -> Result<()> {
    let mut response = source
        .open(&job.source_url)
        .await
        .map_err(|e| TransferError::Connection(e.to_string()))?;

    if progress.total == 0
        && let Some(length) = response_length(response.headers())
    {
        progress.total = length;
    }

    let mut writer = storage.writer(&job.object_key, job.content_type.as_deref());
    let mut throttle = ProgressThrottle::new(interval);

    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    debug!(job_id = %job.job_id, error = %abort_err, "Writer abort failed");
                }
                return Err(TransferError::Connection(e.to_string()));
            }
        };

        progress.advance(chunk.len() as u64);

        if let Err(e) = writer.put(chunk).await {
            if let Err(abort_err) = writer.abort().await {
                debug!(job_id = %job.job_id, error = %abort_err, "Writer abort failed");
            }
            return Err(StorageError::from(e).into());
        }

        if throttle.ready() {
            if let Err(e) = sink.record(progress).await {
                warn!(job_id = %job.job_id, error = %e, "Failed to persist progress snapshot");
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        if let Err(abort_err) = writer.abort().await {
            debug!(job_id = %job.job_id, error = %abort_err, "Writer abort failed");
        }
        return Err(StorageError::from(e).into());
    }

    Ok(())
}

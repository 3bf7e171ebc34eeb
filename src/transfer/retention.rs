//! Pruning of abandoned jobs, store side included

use tracing::{info, warn};

use crate::ledger::{JobLedger, PruneStats};
use crate::storage::StorageClient;

use super::error::Result;
use super::types::JobStatus;

/// Remove jobs idle for longer than `ttl_days`.
///
/// A job still accepting parts owns an open multipart upload that nothing
/// else references, so the upload is aborted first. If the abort fails the
/// record is kept and the next prune tries again.
pub async fn prune_stale(
    ledger: &JobLedger,
    storage: &StorageClient,
    ttl_days: u32,
) -> Result<PruneStats> {
    info!(ttl_days, "Starting pruning process");

    let mut doomed = Vec::new();
    let mut aborted = 0;
    let mut kept = 0;

    for record in ledger.stale_jobs(ttl_days)? {
        if record.status == JobStatus::AwaitingParts
            && let Some(upload_id) = record.upload_id.as_deref()
        {
            let handle = storage.resume_multipart(&record.object_key, upload_id);
            if let Err(e) = storage.abort_multipart(&handle).await {
                warn!(job_id = %record.job_id, upload_id, error = %e, "Could not abort stale upload, keeping job");
                kept += 1;
                continue;
            }
            aborted += 1;
        }
        doomed.push(record.job_id);
    }

    let mut stats = ledger.prune_jobs(&doomed)?;
    stats.uploads_aborted = aborted;
    stats.jobs_kept = kept;
    Ok(stats)
}

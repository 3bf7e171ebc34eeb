/// Retention for stranded job records
use chrono::{DateTime, Utc};
use fjall::{Keyspace, PartitionHandle};
use tracing::{debug, warn};

use crate::transfer::types::{JobRecord, PartRecord};

use super::error::Result;
use super::partitions::{decode_job_key, encode_job_key, encode_meta_key, encode_part_prefix};

/// Metadata key holding the unix timestamp of the last prune
pub const META_LAST_PRUNE: &str = "last_prune";

/// Pruning statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneStats {
    pub jobs_pruned: usize,
    pub parts_pruned: usize,
    pub uploads_aborted: usize,
    /// Stale jobs left in place because their upload could not be aborted
    pub jobs_kept: usize,
}

/// Jobs with no activity since `cutoff`. Activity is the record's
/// `updated_at` or the newest part recorded for it, whichever is later.
pub fn stale_jobs(
    jobs_partition: &PartitionHandle,
    parts_partition: &PartitionHandle,
    cutoff: DateTime<Utc>,
) -> Result<Vec<JobRecord>> {
    let mut expired = Vec::new();
    for item in jobs_partition.iter() {
        let (key, value) = item?;
        let Some(job_id) = decode_job_key(&key) else {
            warn!("Skipping malformed job key during prune");
            continue;
        };
        let record = match serde_json::from_slice::<JobRecord>(&value) {
            Ok(record) => record,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Skipping unreadable job record during prune");
                continue;
            }
        };
        if record.updated_at >= cutoff {
            continue;
        }

        let mut active = false;
        for item in parts_partition.prefix(encode_part_prefix(&job_id)) {
            let (_, value) = item?;
            if serde_json::from_slice::<PartRecord>(&value)
                .is_ok_and(|part| part.recorded_at >= cutoff)
            {
                active = true;
                break;
            }
        }
        if !active {
            expired.push(record);
        }
    }
    Ok(expired)
}

/// Remove the given jobs with their part records, each in its own atomic
/// batch, and stamp the prune time.
pub fn remove_jobs(
    keyspace: &Keyspace,
    jobs_partition: &PartitionHandle,
    parts_partition: &PartitionHandle,
    metadata_partition: &PartitionHandle,
    job_ids: &[String],
) -> Result<PruneStats> {
    let mut stats = PruneStats::default();

    for job_id in job_ids {
        let mut part_keys = Vec::new();
        for item in parts_partition.prefix(encode_part_prefix(job_id)) {
            let (key, _) = item?;
            part_keys.push(key);
        }

        let mut batch = keyspace.batch();
        batch.remove(jobs_partition, encode_job_key(job_id));
        stats.parts_pruned += part_keys.len();
        for key in part_keys {
            batch.remove(parts_partition, key);
        }
        batch.commit()?;

        debug!(job_id = %job_id, "Pruned stale job");
        stats.jobs_pruned += 1;
    }

    metadata_partition.insert(
        encode_meta_key(META_LAST_PRUNE),
        Utc::now().timestamp().to_string().into_bytes(),
    )?;
    keyspace.persist(fjall::PersistMode::SyncAll)?;

    Ok(stats)
}

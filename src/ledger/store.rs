use std::path::Path;

use chrono::{Duration, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use crate::transfer::types::{JobRecord, PartRecord};

use super::error::Result;
use super::partitions::{encode_job_key, encode_part_key, encode_part_prefix};
use super::pruning::{PruneStats, remove_jobs, stale_jobs};

/// Fjall-backed persistent storage for job records and part completion tokens
#[derive(Clone)]
pub struct JobLedger {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    parts: PartitionHandle,
    metadata: PartitionHandle,
}

impl JobLedger {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening job ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let parts = keyspace.open_partition("parts", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            jobs,
            parts,
            metadata,
        })
    }

    /// Get a job record by ID
    pub fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        match self.jobs.get(encode_job_key(job_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Store or overwrite a job record
    pub fn put_job(&self, record: &JobRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        self.jobs.insert(encode_job_key(&record.job_id), value)?;
        debug!(job_id = %record.job_id, status = ?record.status, "Stored job record");
        Ok(())
    }

    /// Write a fresh job record and drop part records left by an earlier
    /// attempt under the same id, in one atomic batch.
    pub fn begin_job(&self, record: &JobRecord) -> Result<usize> {
        let stale = self.part_keys(&record.job_id)?;
        let value = serde_json::to_vec(record)?;

        let mut batch = self.keyspace.batch();
        batch.insert(&self.jobs, encode_job_key(&record.job_id), value);
        for key in &stale {
            batch.remove(&self.parts, key.clone());
        }
        batch.commit()?;

        if !stale.is_empty() {
            debug!(job_id = %record.job_id, cleared = stale.len(), "Cleared stale part records");
        }
        Ok(stale.len())
    }

    /// Record a part completion token, replacing any earlier token for the
    /// same part number.
    pub fn put_part(&self, job_id: &str, part: &PartRecord) -> Result<()> {
        let value = serde_json::to_vec(part)?;
        self.parts
            .insert(encode_part_key(job_id, part.part_number), value)?;
        Ok(())
    }

    /// All part records for a job, ascending by part number
    pub fn list_parts(&self, job_id: &str) -> Result<Vec<PartRecord>> {
        let mut parts = Vec::new();
        for item in self.parts.prefix(encode_part_prefix(job_id)) {
            let (_, value) = item?;
            parts.push(serde_json::from_slice(&value)?);
        }
        Ok(parts)
    }

    pub fn count_parts(&self, job_id: &str) -> Result<usize> {
        let mut count = 0;
        for item in self.parts.prefix(encode_part_prefix(job_id)) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove a job record and all of its parts atomically
    pub fn clear_job(&self, job_id: &str) -> Result<()> {
        let part_keys = self.part_keys(job_id)?;

        let mut batch = self.keyspace.batch();
        batch.remove(&self.jobs, encode_job_key(job_id));
        for key in part_keys {
            batch.remove(&self.parts, key);
        }
        batch.commit()?;

        debug!(job_id, "Cleared job state");
        Ok(())
    }

    /// Jobs with no activity within `ttl_days`
    pub fn stale_jobs(&self, ttl_days: u32) -> Result<Vec<JobRecord>> {
        let cutoff = Utc::now() - Duration::days(i64::from(ttl_days));
        stale_jobs(&self.jobs, &self.parts, cutoff)
    }

    /// Remove the given jobs and their parts
    pub fn prune_jobs(&self, job_ids: &[String]) -> Result<PruneStats> {
        let stats = remove_jobs(
            &self.keyspace,
            &self.jobs,
            &self.parts,
            &self.metadata,
            job_ids,
        )?;
        info!(
            jobs_pruned = stats.jobs_pruned,
            parts_pruned = stats.parts_pruned,
            "Pruning completed"
        );
        Ok(stats)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Get internal statistics (for debugging/monitoring)
    pub fn stats(&self) -> Result<LedgerStats> {
        let mut job_count = 0;
        let mut part_count = 0;

        for item in self.jobs.iter() {
            item?;
            job_count += 1;
        }

        for item in self.parts.iter() {
            item?;
            part_count += 1;
        }

        Ok(LedgerStats {
            job_count,
            part_count,
        })
    }

    fn part_keys(&self, job_id: &str) -> Result<Vec<fjall::Slice>> {
        let mut keys = Vec::new();
        for item in self.parts.prefix(encode_part_prefix(job_id)) {
            let (key, _) = item?;
            keys.push(key);
        }
        Ok(keys)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStats {
    pub job_count: usize,
    pub part_count: usize,
}

//! Per-job actor owning one job's ledger state
//!
//! Metadata reads and writes for a job happen under the actor's mutex.
//! Range fetches and part uploads run outside it, so chunks of the same
//! job proceed concurrently while their bookkeeping stays linearized.

use std::sync::{Arc, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::ledger::JobLedger;
use crate::observability::Metrics;
use crate::source::SourceClient;
use crate::storage::StorageClient;

use super::error::{Result, TransferError};
use super::fallback::{self, FallbackJob};
use super::planner;
use super::service::JobService;
use super::types::{
    ChunkOutcome, ChunkRange, FinishOutcome, InitOutcome, JobRecord, JobStatus, JobStatusReport,
    PartRecord, Progress, ProgressStatus, TransferMode,
};

/// Process-wide collaborators shared by every job actor
pub struct TransferContext {
    pub ledger: JobLedger,
    pub storage: StorageClient,
    pub source: SourceClient,
    pub settings: TransferConfig,
    /// Supervises single-stream copies; drained on shutdown
    pub tasks: TaskTracker,
    pub metrics: Arc<Metrics>,
}

pub struct JobActor {
    job_id: String,
    ctx: Arc<TransferContext>,
    /// Serializes ledger bookkeeping for this job
    lock: Arc<Mutex<()>>,
    /// Never held across an await, so busyness is readable without `lock`
    fallback: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl JobActor {
    pub fn new(job_id: impl Into<String>, ctx: Arc<TransferContext>) -> Self {
        Self {
            job_id: job_id.into(),
            ctx,
            lock: Arc::new(Mutex::new(())),
            fallback: std::sync::Mutex::new(None),
        }
    }

    /// True while a single-stream copy spawned by this actor is in flight
    pub fn is_busy(&self) -> bool {
        self.fallback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn set_fallback(&self, handle: JoinHandle<()>) {
        *self
            .fallback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn load(&self) -> Result<JobRecord> {
        self.ctx
            .ledger
            .get_job(&self.job_id)?
            .ok_or_else(|| TransferError::JobNotFound(self.job_id.clone()))
    }

    /// Abort the multipart upload of an earlier attempt, if any
    async fn abort_previous(&self, previous: &JobRecord) {
        let Some(upload_id) = previous.upload_id.as_deref() else {
            return;
        };
        let handle = self
            .ctx
            .storage
            .resume_multipart(&previous.object_key, upload_id);

        match self.ctx.storage.abort_multipart(&handle).await {
            Ok(()) => debug!(job_id = %self.job_id, upload_id, "Aborted stale multipart upload"),
            Err(e) => {
                debug!(job_id = %self.job_id, upload_id, error = %e, "Stale upload abort failed")
            }
        }
    }

    fn new_record(
        &self,
        source_url: &str,
        filename: &str,
        plan_total: u64,
        content_type: Option<String>,
        mode: TransferMode,
    ) -> JobRecord {
        let now = Utc::now();
        JobRecord {
            job_id: self.job_id.clone(),
            source_url: source_url.to_string(),
            filename: filename.to_string(),
            object_key: self.ctx.settings.object_key(filename),
            total_size: plan_total,
            chunk_size: 0,
            content_type,
            mode,
            upload_id: None,
            status: JobStatus::Running,
            progress: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Owning checks shared by chunk and finish
    fn require_open_parallel(&self, record: &JobRecord) -> Result<String> {
        if record.mode != TransferMode::Parallel {
            return Err(TransferError::InvalidRequest(format!(
                "job {} is not a parallel transfer",
                self.job_id
            )));
        }
        if record.status != JobStatus::AwaitingParts {
            return Err(TransferError::InvalidRequest(format!(
                "job {} is {:?}, not accepting parts",
                self.job_id, record.status
            )));
        }
        record
            .upload_id
            .clone()
            .ok_or_else(|| TransferError::JobNotFound(self.job_id.clone()))
    }
}

#[async_trait]
impl JobService for JobActor {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    async fn init(&self, source_url: &str, filename: &str) -> Result<InitOutcome> {
        let _guard = self.lock.lock().await;
        let previous = self.ctx.ledger.get_job(&self.job_id)?;

        if let Some(previous) = &previous
            && previous.mode == TransferMode::Single
            && previous.status == JobStatus::Running
            && self.is_busy()
        {
            info!(job_id = %self.job_id, "Single-stream transfer already running");
            return Ok(InitOutcome {
                job_id: self.job_id.clone(),
                mode: TransferMode::Single,
                total_size: previous.total_size,
                chunk_size: self.ctx.settings.chunk_size.as_u64(),
                object_key: previous.object_key.clone(),
                ranges: Vec::new(),
                already_running: true,
            });
        }

        let probe = self
            .ctx
            .source
            .probe(source_url)
            .await
            .map_err(|e| TransferError::Connection(e.to_string()))?;

        let chunk_size = self.ctx.settings.chunk_size.as_u64();
        let plan = planner::plan(probe.total_size, chunk_size, probe.range_capable);

        if let Some(previous) = &previous {
            self.abort_previous(previous).await;
        }

        let mut record = self.new_record(
            source_url,
            filename,
            plan.total_size,
            probe.content_type.clone(),
            plan.mode,
        );

        match plan.mode {
            TransferMode::Parallel => {
                let handle = self.ctx.storage.create_multipart(&record.object_key).await?;
                record.upload_id = Some(handle.upload_id.clone());
                record.chunk_size = chunk_size;
                record.status = JobStatus::AwaitingParts;

                if let Err(e) = self.ctx.ledger.begin_job(&record) {
                    if let Err(abort_err) = self.ctx.storage.abort_multipart(&handle).await {
                        warn!(job_id = %self.job_id, error = %abort_err, "Failed to abort orphaned upload");
                    }
                    return Err(e.into());
                }
            }
            TransferMode::Single => {
                let progress = Progress::started(plan.total_size);
                record.progress = Some(progress.clone());
                self.ctx.ledger.begin_job(&record)?;

                let job = FallbackJob {
                    job_id: self.job_id.clone(),
                    source_url: record.source_url.clone(),
                    object_key: record.object_key.clone(),
                    content_type: record.content_type.clone(),
                    progress,
                };
                let sink = ProgressSink {
                    job_id: self.job_id.clone(),
                    ledger: self.ctx.ledger.clone(),
                    lock: self.lock.clone(),
                    metrics: self.ctx.metrics.clone(),
                };
                let task = fallback::run(
                    job,
                    self.ctx.source.clone(),
                    self.ctx.storage.clone(),
                    sink,
                    self.ctx.settings.progress_interval(),
                );
                self.set_fallback(self.ctx.tasks.spawn(task));
            }
        }

        self.ctx.metrics.job_initialized();
        info!(
            job_id = %self.job_id,
            mode = ?plan.mode,
            total_size = plan.total_size,
            parts = plan.ranges.len(),
            object_key = %record.object_key,
            "Job initialized"
        );

        Ok(InitOutcome {
            job_id: self.job_id.clone(),
            mode: plan.mode,
            total_size: plan.total_size,
            chunk_size,
            object_key: record.object_key,
            ranges: plan.ranges,
            already_running: false,
        })
    }

    async fn process_chunk(&self, range: ChunkRange) -> Result<ChunkOutcome> {
        let record = {
            let _guard = self.lock.lock().await;
            self.load()?
        };
        let upload_id = self.require_open_parallel(&record)?;

        if range.part_number == 0 || range.start > range.end || range.end >= record.total_size {
            return Err(TransferError::InvalidRequest(format!(
                "range {}-{} (part {}) outside object of {} bytes",
                range.start, range.end, range.part_number, record.total_size
            )));
        }

        let started = Instant::now();

        let body = self
            .ctx
            .source
            .fetch_range(&record.source_url, &range)
            .await
            .map_err(|e| TransferError::RangeFetch(e.to_string()))?;
        let bytes = body.len() as u64;

        let handle = self
            .ctx
            .storage
            .resume_multipart(&record.object_key, &upload_id);
        let token = self
            .ctx
            .storage
            .upload_part(&handle, range.part_number, body)
            .await
            .map_err(|e| TransferError::PartUpload(e.to_string()))?;

        {
            let _guard = self.lock.lock().await;
            let current = self.load()?;
            if current.upload_id.as_deref() != Some(upload_id.as_str()) {
                return Err(TransferError::JobNotFound(self.job_id.clone()));
            }
            self.require_open_parallel(&current)?;

            self.ctx.ledger.put_part(
                &self.job_id,
                &PartRecord {
                    part_number: range.part_number,
                    token: token.clone(),
                    size: bytes,
                    recorded_at: Utc::now(),
                },
            )?;
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.ctx.metrics.chunk_processed(bytes);
        debug!(
            job_id = %self.job_id,
            part_number = range.part_number,
            bytes,
            elapsed_ms,
            "Chunk recorded"
        );

        Ok(ChunkOutcome {
            part_number: range.part_number,
            token,
            bytes,
            elapsed_ms,
        })
    }

    async fn finish(&self) -> Result<FinishOutcome> {
        let _guard = self.lock.lock().await;
        let record = self.load()?;
        let upload_id = self.require_open_parallel(&record)?;

        let mut parts = self.ctx.ledger.list_parts(&self.job_id)?;
        if parts.is_empty() {
            return Err(TransferError::NoParts(self.job_id.clone()));
        }
        parts.sort_by_key(|part| part.part_number);

        // The store assembles parts by position, so gaps would silently corrupt the object
        for (idx, part) in parts.iter().enumerate() {
            if part.part_number as usize != idx + 1 {
                return Err(TransferError::Completion(format!(
                    "part {} missing before part {}",
                    idx + 1,
                    part.part_number
                )));
            }
        }
        let expected = record.expected_parts();
        if parts.len() as u64 != expected {
            return Err(TransferError::Completion(format!(
                "{} of {} parts recorded",
                parts.len(),
                expected
            )));
        }

        let handle = self
            .ctx
            .storage
            .resume_multipart(&record.object_key, &upload_id);
        let tokens = parts.iter().map(|part| part.token.clone()).collect();
        let uploaded = self
            .ctx
            .storage
            .complete_multipart(&handle, tokens)
            .await
            .map_err(|e| TransferError::Completion(e.to_string()))?;

        self.ctx.ledger.clear_job(&self.job_id)?;
        self.ctx.metrics.job_finished();

        let size = match self.ctx.storage.head(&record.object_key).await {
            Ok(Some(info)) => info.size,
            Ok(None) | Err(_) => {
                warn!(job_id = %self.job_id, "Could not stat completed object, reporting planned size");
                record.total_size
            }
        };

        info!(
            job_id = %self.job_id,
            object_key = %record.object_key,
            parts = parts.len(),
            size,
            "Job finished"
        );

        Ok(FinishOutcome {
            object_key: record.object_key,
            parts: parts.len(),
            size,
            e_tag: uploaded.etag,
        })
    }

    async fn status(&self) -> Result<JobStatusReport> {
        let Some(record) = self.ctx.ledger.get_job(&self.job_id)? else {
            return Ok(JobStatusReport::Idle);
        };

        Ok(match record.mode {
            TransferMode::Single => JobStatusReport::Single {
                progress: record.progress.unwrap_or_else(Progress::idle),
            },
            TransferMode::Parallel => JobStatusReport::Parallel {
                state: record.status,
                parts_recorded: self.ctx.ledger.count_parts(&self.job_id)?,
                error: record.error,
            },
        })
    }

    async fn mark_failed(&self, reason: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut record = self.load()?;

        record.status = JobStatus::Failed;
        record.error = Some(reason.to_string());
        if let Some(progress) = record.progress.as_mut() {
            progress.fail(reason);
        }
        record.touch();
        self.ctx.ledger.put_job(&record)?;
        self.ctx.metrics.job_failed();

        if let Some(upload_id) = record.upload_id.as_deref() {
            let handle = self
                .ctx
                .storage
                .resume_multipart(&record.object_key, upload_id);
            if let Err(e) = self.ctx.storage.abort_multipart(&handle).await {
                warn!(job_id = %self.job_id, error = %e, "Failed to abort upload of failed job");
            }
        }

        warn!(job_id = %self.job_id, reason, "Job marked failed");
        Ok(())
    }
}

/// Write handle the fallback task uses to publish progress into the job record
pub struct ProgressSink {
    job_id: String,
    ledger: JobLedger,
    lock: Arc<Mutex<()>>,
    metrics: Arc<Metrics>,
}

impl ProgressSink {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn record(&self, progress: &Progress) -> Result<()> {
        let _guard = self.lock.lock().await;
        let Some(mut record) = self.ledger.get_job(&self.job_id)? else {
            return Err(TransferError::JobNotFound(self.job_id.clone()));
        };

        record.status = match progress.status {
            ProgressStatus::Completed => JobStatus::Completed,
            ProgressStatus::Failed => JobStatus::Failed,
            ProgressStatus::Idle | ProgressStatus::Running => JobStatus::Running,
        };
        record.total_size = record.total_size.max(progress.total);
        record.error = progress.error.clone();
        record.progress = Some(progress.clone());
        record.touch();
        self.ledger.put_job(&record)?;

        match progress.status {
            ProgressStatus::Completed => self.metrics.job_finished(),
            ProgressStatus::Failed => self.metrics.job_failed(),
            ProgressStatus::Idle | ProgressStatus::Running => {}
        }
        Ok(())
    }
}

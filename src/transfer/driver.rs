//! Client-side worker pool that pushes a chunk plan through a `JobService`

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bon::Builder;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::humanize::{self, ByteSize};
use crate::observability::TransferMetrics;

use super::error::{DriverError, TransferError};
use super::service::JobService;
use super::types::{
    ChunkRange, FinishOutcome, InitOutcome, JobStatusReport, ProgressStatus, TransferMode,
};

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct DriverReport {
    pub job_id: String,
    pub mode: TransferMode,
    pub object_key: String,
    pub chunks: u64,
    pub bytes: u64,
    pub elapsed: Duration,
    /// Bytes per second over the whole run
    pub throughput: f64,
    pub e_tag: Option<String>,
}

impl fmt::Display for DriverReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({:?}, {} chunks, {} in {:.1}s, {})",
            self.job_id,
            self.object_key,
            self.mode,
            self.chunks,
            ByteSize(self.bytes),
            self.elapsed.as_secs_f64(),
            humanize::rate(self.bytes, self.elapsed)
        )
    }
}

#[derive(Builder)]
pub struct ChunkDriver {
    service: Arc<dyn JobService>,
    #[builder(default = 4)]
    workers: usize,
    #[builder(default = 3)]
    chunk_attempts: u32,
    #[builder(default = Duration::from_secs(1))]
    chunk_retry_delay: Duration,
    #[builder(default = 3)]
    finish_attempts: u32,
    #[builder(default = Duration::from_secs(2))]
    finish_backoff: Duration,
    #[builder(default = Duration::from_secs(1))]
    poll_interval: Duration,
}

impl ChunkDriver {
    pub fn from_config(service: Arc<dyn JobService>, config: &DriverConfig) -> Self {
        ChunkDriver::builder()
            .service(service)
            .workers(config.workers)
            .chunk_attempts(config.chunk_attempts)
            .chunk_retry_delay(Duration::from_millis(config.chunk_retry_delay_ms))
            .finish_attempts(config.finish_attempts)
            .finish_backoff(Duration::from_millis(config.finish_backoff_ms))
            .poll_interval(Duration::from_millis(config.poll_interval_ms))
            .build()
    }

    /// Initialize the job and drive it to a stored object
    pub async fn run(&self, source_url: &str, filename: &str) -> Result<DriverReport, DriverError> {
        let init = self
            .service
            .init(source_url, filename)
            .await
            .map_err(DriverError::Fatal)?;

        self.drive(init).await
    }

    /// Drive an already initialized job
    pub async fn drive(&self, init: InitOutcome) -> Result<DriverReport, DriverError> {
        match init.mode {
            TransferMode::Parallel => self.drive_parallel(init).await,
            TransferMode::Single => self.await_single(init).await,
        }
    }

    async fn drive_parallel(&self, init: InitOutcome) -> Result<DriverReport, DriverError> {
        let job_id = self.service.job_id().to_string();
        let chunk_count = init.ranges.len();
        let object_key = init.object_key.clone();
        let total_size = init.total_size;
        let metrics = Arc::new(TransferMetrics::new());
        let queue = Arc::new(Mutex::new(VecDeque::from(init.ranges)));
        let halt = Arc::new(AtomicBool::new(false));

        let worker_count = self.workers.clamp(1, chunk_count.max(1));
        info!(job_id = %job_id, chunks = chunk_count, workers = worker_count, "Starting chunk workers");

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let worker = Worker {
                id: worker_id,
                service: self.service.clone(),
                queue: queue.clone(),
                halt: halt.clone(),
                metrics: metrics.clone(),
                attempts: self.chunk_attempts.max(1),
                retry_delay: self.chunk_retry_delay,
            };
            workers.spawn(worker.run());
        }

        let mut failure: Option<DriverError> = None;
        while let Some(joined) = workers.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(DriverError::Worker(e.to_string())),
            };
            if let Err(e) = result {
                halt.store(true, Ordering::SeqCst);
                failure.get_or_insert(e);
            }
        }

        if let Some(e) = failure {
            warn!(job_id = %job_id, error = %e, "Chunk transfer halted");
            if let Err(mark_err) = self.service.mark_failed(&e.to_string()).await {
                warn!(job_id = %job_id, error = %mark_err, "Could not mark job failed");
            }
            return Err(e);
        }

        let finished = self
            .finish_with_retry(&job_id, || FinishOutcome {
                object_key,
                parts: chunk_count,
                size: total_size,
                e_tag: None,
            })
            .await?;
        let snapshot = metrics.snapshot();
        let report = DriverReport {
            job_id,
            mode: TransferMode::Parallel,
            object_key: finished.object_key,
            chunks: snapshot.chunks,
            bytes: snapshot.bytes,
            elapsed: snapshot.elapsed,
            throughput: snapshot.throughput(),
            e_tag: finished.e_tag,
        };
        info!(
            job_id = %report.job_id,
            parts = finished.parts,
            size = finished.size,
            processing_ms = snapshot.processing_ms,
            "Parallel transfer finished"
        );

        Ok(report)
    }

    /// `planned` describes the object when an earlier attempt turns out to
    /// have completed even though its response never arrived
    async fn finish_with_retry(
        &self,
        job_id: &str,
        planned: impl FnOnce() -> FinishOutcome,
    ) -> Result<FinishOutcome, DriverError> {
        let attempts = self.finish_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.service.finish().await {
                Ok(outcome) => return Ok(outcome),
                Err(TransferError::JobNotFound(detail)) if attempt > 1 => {
                    // A finished job is cleared, so the lost attempt may have succeeded
                    return match self.service.status().await {
                        Ok(JobStatusReport::Idle) => {
                            info!(job_id, attempt, "Earlier finish attempt had completed the job");
                            Ok(planned())
                        }
                        _ => Err(DriverError::Fatal(TransferError::JobNotFound(detail))),
                    };
                }
                Err(e) if !e.is_retryable() => return Err(DriverError::Fatal(e)),
                Err(e) if attempt >= attempts => {
                    return Err(DriverError::FinishExhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.finish_backoff * attempt;
                    warn!(job_id, attempt, error = %e, delay_ms = delay.as_millis() as u64, "Finish failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn await_single(&self, init: InitOutcome) -> Result<DriverReport, DriverError> {
        let job_id = self.service.job_id().to_string();
        let started = std::time::Instant::now();
        let mut consecutive_errors = 0;

        if init.already_running {
            info!(job_id = %job_id, "Attaching to running single-stream transfer");
        }

        loop {
            match self.service.status().await {
                Ok(JobStatusReport::Single { progress }) => {
                    consecutive_errors = 0;
                    match progress.status {
                        ProgressStatus::Completed => {
                            let elapsed = started.elapsed();
                            return Ok(DriverReport {
                                job_id,
                                mode: TransferMode::Single,
                                object_key: init.object_key,
                                chunks: 1,
                                bytes: progress.downloaded,
                                elapsed,
                                throughput: progress.downloaded as f64
                                    / elapsed.as_secs_f64().max(f64::EPSILON),
                                e_tag: None,
                            });
                        }
                        ProgressStatus::Failed => {
                            return Err(DriverError::SingleTransferFailed(
                                progress.error.unwrap_or_else(|| "unknown error".to_string()),
                            ));
                        }
                        ProgressStatus::Idle | ProgressStatus::Running => {
                            debug!(
                                job_id = %job_id,
                                downloaded = progress.downloaded,
                                percent = progress.percent,
                                "Single-stream transfer in progress"
                            );
                        }
                    }
                }
                Ok(JobStatusReport::Idle) => {
                    return Err(DriverError::Fatal(TransferError::JobNotFound(job_id)));
                }
                Ok(JobStatusReport::Parallel { .. }) => {
                    return Err(DriverError::Fatal(TransferError::InvalidRequest(format!(
                        "job {job_id} was re-initialized in parallel mode"
                    ))));
                }
                Err(e) if !e.is_retryable() => return Err(DriverError::Fatal(e)),
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= self.chunk_attempts.max(1) {
                        return Err(DriverError::Fatal(e));
                    }
                    warn!(job_id = %job_id, error = %e, "Status poll failed");
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// One logical worker pulling ranges off the shared queue
struct Worker {
    id: usize,
    service: Arc<dyn JobService>,
    queue: Arc<Mutex<VecDeque<ChunkRange>>>,
    halt: Arc<AtomicBool>,
    metrics: Arc<TransferMetrics>,
    attempts: u32,
    retry_delay: Duration,
}

impl Worker {
    async fn run(self) -> Result<(), DriverError> {
        loop {
            if self.halt.load(Ordering::SeqCst) {
                return Ok(());
            }
            let Some(range) = self.queue.lock().await.pop_front() else {
                return Ok(());
            };
            self.process(range).await?;
        }
    }

    async fn process(&self, range: ChunkRange) -> Result<(), DriverError> {
        let job_id = self.service.job_id();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.service.process_chunk(range).await {
                Ok(outcome) => {
                    let snapshot = self.metrics.record_chunk(outcome.bytes, outcome.elapsed_ms);
                    info!(
                        job_id,
                        worker = self.id,
                        part_number = range.part_number,
                        bytes = outcome.bytes,
                        elapsed_ms = outcome.elapsed_ms,
                        throughput = %humanize::rate(snapshot.bytes, snapshot.elapsed),
                        "Chunk completed"
                    );
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => return Err(DriverError::Fatal(e)),
                Err(e) if attempt >= self.attempts => {
                    return Err(DriverError::ChunkExhausted {
                        part_number: range.part_number,
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(
                        job_id,
                        worker = self.id,
                        part_number = range.part_number,
                        attempt,
                        error = %e,
                        "Chunk failed, retrying"
                    );
                    if self.halt.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::error::Result;
    use crate::transfer::planner::partition;
    use crate::transfer::types::{ChunkOutcome, Progress};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;

    /// Scripted service: parts fail a set number of times before succeeding
    #[derive(Default)]
    struct FakeService {
        chunk_failures: std::sync::Mutex<HashMap<u32, u32>>,
        fatal_part: Option<u32>,
        finish_errors: std::sync::Mutex<Vec<TransferError>>,
        chunk_calls: AtomicU32,
        finish_calls: AtomicU32,
        status_calls: AtomicU32,
        /// Finish succeeds server-side but the caller only sees this error
        lost_finish: Option<TransferError>,
        finished: std::sync::atomic::AtomicBool,
        marked_failed: std::sync::Mutex<Option<String>>,
        single: bool,
    }

    impl FakeService {
        fn failing(part_number: u32, times: u32) -> Self {
            let service = FakeService::default();
            service
                .chunk_failures
                .lock()
                .unwrap()
                .insert(part_number, times);
            service
        }
    }

    #[async_trait]
    impl JobService for FakeService {
        fn job_id(&self) -> &str {
            "fake-job"
        }

        async fn init(&self, _source_url: &str, _filename: &str) -> Result<InitOutcome> {
            let (mode, ranges) = if self.single {
                (TransferMode::Single, Vec::new())
            } else {
                (TransferMode::Parallel, partition(300, 100))
            };
            Ok(InitOutcome {
                job_id: "fake-job".to_string(),
                mode,
                total_size: 300,
                chunk_size: 100,
                object_key: "out.bin".to_string(),
                ranges,
                already_running: false,
            })
        }

        async fn process_chunk(&self, range: ChunkRange) -> Result<ChunkOutcome> {
            self.chunk_calls.fetch_add(1, Ordering::SeqCst);
            if self.fatal_part == Some(range.part_number) {
                return Err(TransferError::JobNotFound("fake-job".to_string()));
            }
            {
                let mut failures = self.chunk_failures.lock().unwrap();
                if let Some(remaining) = failures.get_mut(&range.part_number)
                    && *remaining > 0
                {
                    *remaining -= 1;
                    return Err(TransferError::RangeFetch("HTTP 503".to_string()));
                }
            }
            Ok(ChunkOutcome {
                part_number: range.part_number,
                token: format!("etag-{}", range.part_number),
                bytes: range.size(),
                elapsed_ms: 1,
            })
        }

        async fn finish(&self) -> Result<FinishOutcome> {
            self.finish_calls.fetch_add(1, Ordering::SeqCst);
            if self.finished.load(Ordering::SeqCst) {
                return Err(TransferError::JobNotFound("fake-job".to_string()));
            }
            if let Some(e) = &self.lost_finish {
                self.finished.store(true, Ordering::SeqCst);
                return Err(TransferError::Remote(e.to_string()));
            }
            if let Some(e) = self.finish_errors.lock().unwrap().pop() {
                return Err(e);
            }
            Ok(FinishOutcome {
                object_key: "out.bin".to_string(),
                parts: 3,
                size: 300,
                e_tag: Some("final".to_string()),
            })
        }

        async fn status(&self) -> Result<JobStatusReport> {
            if self.finished.load(Ordering::SeqCst) {
                return Ok(JobStatusReport::Idle);
            }
            let calls = self.status_calls.fetch_add(1, Ordering::SeqCst);
            let mut progress = Progress::started(300);
            progress.advance(100 * u64::from(calls.min(3)));
            if calls >= 2 {
                progress.complete();
            }
            Ok(JobStatusReport::Single { progress })
        }

        async fn mark_failed(&self, reason: &str) -> Result<()> {
            *self.marked_failed.lock().unwrap() = Some(reason.to_string());
            Ok(())
        }
    }

    fn driver(service: Arc<FakeService>) -> ChunkDriver {
        ChunkDriver::builder()
            .service(service)
            .workers(4)
            .chunk_retry_delay(Duration::from_millis(1))
            .finish_backoff(Duration::from_millis(1))
            .poll_interval(Duration::from_millis(1))
            .build()
    }

    #[tokio::test]
    async fn test_all_chunks_then_finish() {
        let service = Arc::new(FakeService::default());
        let report = driver(service.clone()).run("http://src", "out.bin").await.unwrap();

        assert_eq!(report.mode, TransferMode::Parallel);
        assert_eq!(report.chunks, 3);
        assert_eq!(report.bytes, 300);
        assert_eq!(report.e_tag.as_deref(), Some("final"));
        assert_eq!(service.chunk_calls.load(Ordering::SeqCst), 3);
        assert_eq!(service.finish_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chunk_retry_recovers() {
        let service = Arc::new(FakeService::failing(2, 2));
        let report = driver(service.clone()).run("http://src", "out.bin").await.unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(service.chunk_calls.load(Ordering::SeqCst), 5);
        assert_eq!(service.finish_calls.load(Ordering::SeqCst), 1);
        assert!(service.marked_failed.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exhausted_chunk_marks_failed_and_skips_finish() {
        let service = Arc::new(FakeService::failing(2, 10));
        let err = driver(service.clone())
            .run("http://src", "out.bin")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DriverError::ChunkExhausted {
                part_number: 2,
                attempts: 3,
                ..
            }
        ));
        assert_eq!(service.finish_calls.load(Ordering::SeqCst), 0);
        let reason = service.marked_failed.lock().unwrap().clone().unwrap();
        assert!(reason.contains("part 2"));
    }

    #[tokio::test]
    async fn test_fatal_chunk_error_is_not_retried() {
        let service = Arc::new(FakeService {
            fatal_part: Some(1),
            ..FakeService::default()
        });
        let driver = ChunkDriver::builder()
            .service(service.clone())
            .workers(1)
            .chunk_retry_delay(Duration::from_millis(1))
            .build();

        let err = driver.run("http://src", "out.bin").await.unwrap_err();

        assert!(matches!(
            err,
            DriverError::Fatal(TransferError::JobNotFound(_))
        ));
        assert_eq!(service.chunk_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.finish_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_finish_retried_on_completion_error() {
        let service = Arc::new(FakeService::default());
        service
            .finish_errors
            .lock()
            .unwrap()
            .push(TransferError::Completion("InvalidPart".to_string()));

        driver(service.clone()).run("http://src", "out.bin").await.unwrap();
        assert_eq!(service.finish_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lost_finish_response_counts_as_finished() {
        let service = Arc::new(FakeService {
            lost_finish: Some(TransferError::Remote("connection reset".to_string())),
            ..FakeService::default()
        });

        let report = driver(service.clone()).run("http://src", "out.bin").await.unwrap();
        assert_eq!(report.object_key, "out.bin");
        assert_eq!(report.e_tag, None);
        assert_eq!(service.finish_calls.load(Ordering::SeqCst), 2);
        assert!(service.marked_failed.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_finish_not_found_is_fatal() {
        let service = Arc::new(FakeService::default());
        service
            .finish_errors
            .lock()
            .unwrap()
            .push(TransferError::JobNotFound("fake-job".to_string()));

        let err = driver(service.clone())
            .run("http://src", "out.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Fatal(TransferError::JobNotFound(_))));
        assert_eq!(service.status_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_finish_exhausted() {
        let service = Arc::new(FakeService::default());
        for _ in 0..3 {
            service
                .finish_errors
                .lock()
                .unwrap()
                .push(TransferError::Completion("InvalidPart".to_string()));
        }

        let err = driver(service.clone())
            .run("http://src", "out.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::FinishExhausted { attempts: 3, .. }));
        assert_eq!(service.finish_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_parts_is_not_retried() {
        let service = Arc::new(FakeService::default());
        service
            .finish_errors
            .lock()
            .unwrap()
            .push(TransferError::NoParts("fake-job".to_string()));

        let err = driver(service.clone())
            .run("http://src", "out.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Fatal(TransferError::NoParts(_))));
        assert_eq!(service.finish_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_mode_polls_until_completed() {
        let service = Arc::new(FakeService {
            single: true,
            ..FakeService::default()
        });

        let report = driver(service.clone()).run("http://src", "out.bin").await.unwrap();
        assert_eq!(report.mode, TransferMode::Single);
        assert_eq!(report.bytes, 200);
        assert_eq!(service.status_calls.load(Ordering::SeqCst), 3);
        assert_eq!(service.chunk_calls.load(Ordering::SeqCst), 0);
    }
}

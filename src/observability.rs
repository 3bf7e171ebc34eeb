//! Service and transfer counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Server-side counters, exposed through `/health`
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_initialized: AtomicU64,
    chunks_processed: AtomicU64,
    bytes_uploaded: AtomicU64,
    jobs_finished: AtomicU64,
    jobs_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_initialized(&self) {
        self.jobs_initialized.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_initialized", "Metric incremented");
    }

    pub fn chunk_processed(&self, bytes: u64) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn job_finished(&self) {
        self.jobs_finished.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_finished", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_initialized: self.jobs_initialized.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            jobs_finished: self.jobs_finished.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_initialized: u64,
    pub chunks_processed: u64,
    pub bytes_uploaded: u64,
    pub jobs_finished: u64,
    pub jobs_failed: u64,
}

/// Driver-side aggregation shared by all workers of one run
#[derive(Debug)]
pub struct TransferMetrics {
    started: Instant,
    chunks: AtomicU64,
    bytes: AtomicU64,
    processing_ms: AtomicU64,
}

impl Default for TransferMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            chunks: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            processing_ms: AtomicU64::new(0),
        }
    }

    /// Add one completed chunk, returning the updated totals
    pub fn record_chunk(&self, bytes: u64, processing_ms: u64) -> TransferSnapshot {
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.processing_ms.fetch_add(processing_ms, Ordering::Relaxed);
        self.snapshot()
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            processing_ms: self.processing_ms.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferSnapshot {
    pub chunks: u64,
    pub bytes: u64,
    /// Sum of server-reported processing time across chunks
    pub processing_ms: u64,
    pub elapsed: Duration,
}

impl TransferSnapshot {
    /// Completed bytes over wall time, in bytes per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= f64::EPSILON {
            return 0.0;
        }
        self.bytes as f64 / secs
    }
}

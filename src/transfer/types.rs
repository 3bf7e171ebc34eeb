use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a job moves bytes from the source into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Single,
    Parallel,
}

/// Inclusive byte span `[start, end]` uploaded as one multipart part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    /// 1-based
    pub part_number: u32,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for an HTTP `Range` request header
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub mode: TransferMode,
    pub total_size: u64,
    pub chunk_size: u64,
    /// Empty in single mode
    pub ranges: Vec<ChunkRange>,
}

/// Lifecycle state of a persisted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Single-stream copy in flight
    Running,
    /// Parallel upload open, parts being recorded
    AwaitingParts,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Single-stream transfer progress, stored inside the job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub status: ProgressStatus,
    pub downloaded: u64,
    /// 0 when the source did not advertise a length
    pub total: u64,
    pub percent: f64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl Progress {
    pub fn idle() -> Self {
        Self {
            status: ProgressStatus::Idle,
            downloaded: 0,
            total: 0,
            percent: 0.0,
            error: None,
            started_at: Utc::now(),
        }
    }

    pub fn started(total: u64) -> Self {
        Self {
            status: ProgressStatus::Running,
            downloaded: 0,
            total,
            percent: 0.0,
            error: None,
            started_at: Utc::now(),
        }
    }

    pub fn advance(&mut self, bytes: u64) {
        self.downloaded += bytes;
        if self.total > 0 {
            self.percent = (self.downloaded as f64 / self.total as f64 * 100.0).min(100.0);
        }
    }

    pub fn complete(&mut self) {
        self.status = ProgressStatus::Completed;
        self.percent = 100.0;
        if self.total == 0 {
            self.total = self.downloaded;
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ProgressStatus::Failed;
        self.error = Some(error.into());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ProgressStatus::Completed | ProgressStatus::Failed
        )
    }
}

/// Durable job metadata, keyed by job id in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub source_url: String,
    pub filename: String,
    pub object_key: String,
    pub total_size: u64,
    /// Planned part size, parallel mode only
    pub chunk_size: u64,
    pub content_type: Option<String>,
    pub mode: TransferMode,
    /// Multipart upload id, parallel mode only
    pub upload_id: Option<String>,
    pub status: JobStatus,
    /// Single mode only
    pub progress: Option<Progress>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Number of parts a complete parallel upload must have
    pub fn expected_parts(&self) -> u64 {
        if self.chunk_size == 0 {
            return 0;
        }
        self.total_size.div_ceil(self.chunk_size)
    }
}

/// Completion token for one uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub part_number: u32,
    pub token: String,
    pub size: u64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitOutcome {
    pub job_id: String,
    pub mode: TransferMode,
    pub total_size: u64,
    pub chunk_size: u64,
    pub object_key: String,
    #[serde(default)]
    pub ranges: Vec<ChunkRange>,
    /// A single-stream copy for this job was already in flight
    #[serde(default)]
    pub already_running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOutcome {
    pub part_number: u32,
    pub token: String,
    pub bytes: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishOutcome {
    pub object_key: String,
    pub parts: usize,
    pub size: u64,
    pub e_tag: Option<String>,
}

/// What `status` reports for a job id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum JobStatusReport {
    /// Nothing has been initialized under this id
    Idle,
    Single {
        progress: Progress,
    },
    Parallel {
        state: JobStatus,
        parts_recorded: usize,
        error: Option<String>,
    },
}

use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ledger_path: default_ledger_path(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

/// Storage provider type
///
/// Only backends implementing `MultipartStore` are offered, since parallel
/// transfers resume uploads by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Memory,
    S3,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Permit plain-http endpoints (MinIO and friends)
    #[serde(default)]
    pub allow_http: bool,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Memory,
            bucket: default_bucket(),
            endpoint: None,
            region: None,
            allow_http: false,
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_bucket() -> String {
    "ingestbox-default".to_string()
}

/// Outbound HTTP settings for source probes and fetches
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Upper bound for a single request, including a full chunk body
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl SourceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("IngestBox/{}", env!("CARGO_PKG_VERSION"))
}

/// Server-side transfer planning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: ByteSize,
    /// Prepended verbatim to the client filename to form the object key
    #[serde(default)]
    pub key_prefix: String,
    /// Minimum spacing between persisted single-stream progress snapshots
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl TransferConfig {
    pub fn object_key(&self, filename: &str) -> String {
        format!("{}{}", self.key_prefix, filename)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            key_prefix: String::new(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

fn default_chunk_size() -> ByteSize {
    ByteSize::mib(20)
}

fn default_progress_interval_ms() -> u64 {
    1000
}

/// Client-side chunk driver
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_attempts")]
    pub chunk_attempts: u32,
    #[serde(default = "default_chunk_retry_delay_ms")]
    pub chunk_retry_delay_ms: u64,
    #[serde(default = "default_attempts")]
    pub finish_attempts: u32,
    #[serde(default = "default_finish_backoff_ms")]
    pub finish_backoff_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            chunk_attempts: default_attempts(),
            chunk_retry_delay_ms: default_chunk_retry_delay_ms(),
            finish_attempts: default_attempts(),
            finish_backoff_ms: default_finish_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_attempts() -> u32 {
    3
}

fn default_chunk_retry_delay_ms() -> u64 {
    1000
}

fn default_finish_backoff_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Job records untouched for longer than this are pruned as stranded
    #[serde(default = "default_job_ttl_days")]
    pub job_ttl_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            job_ttl_days: default_job_ttl_days(),
        }
    }
}

fn default_job_ttl_days() -> u32 {
    7
}

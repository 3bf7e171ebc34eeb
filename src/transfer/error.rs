use thiserror::Error;

use crate::ledger::LedgerError;
use crate::storage::StorageError;

/// Failures of a job operation, each carrying a stable condition code
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("source unreachable: {0}")]
    Connection(String),

    #[error("range fetch failed: {0}")]
    RangeFetch(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("no parts recorded for job {0}")]
    NoParts(String),

    #[error("multipart completion failed: {0}")]
    Completion(String),

    #[error("part upload failed: {0}")]
    PartUpload(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("remote call failed: {0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, TransferError>;

impl TransferError {
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Connection(_) => "CONNECTION_ERROR",
            TransferError::RangeFetch(_) => "RANGE_FETCH_ERROR",
            TransferError::JobNotFound(_) => "JOB_NOT_FOUND",
            TransferError::NoParts(_) => "NO_PARTS",
            TransferError::Completion(_) => "COMPLETION_ERROR",
            TransferError::PartUpload(_) => "PART_UPLOAD_ERROR",
            TransferError::InvalidRequest(_) => "INVALID_PAYLOAD",
            TransferError::Storage(_) | TransferError::Ledger(_) | TransferError::Remote(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// Whether repeating the same call can change the outcome
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Connection(_)
            | TransferError::RangeFetch(_)
            | TransferError::Completion(_)
            | TransferError::PartUpload(_)
            | TransferError::Storage(_)
            | TransferError::Remote(_) => true,
            TransferError::JobNotFound(_)
            | TransferError::NoParts(_)
            | TransferError::InvalidRequest(_)
            | TransferError::Ledger(_) => false,
        }
    }

    /// Rebuild a typed error from an `{code, message}` error body.
    /// `message` is the server's rendering of the error, so the variant's own
    /// prefix is stripped before wrapping it again.
    pub fn from_code(code: &str, message: String) -> Self {
        let build = |detail: String| match code {
            "CONNECTION_ERROR" => TransferError::Connection(detail),
            "RANGE_FETCH_ERROR" => TransferError::RangeFetch(detail),
            "JOB_NOT_FOUND" => TransferError::JobNotFound(detail),
            "NO_PARTS" => TransferError::NoParts(detail),
            "COMPLETION_ERROR" => TransferError::Completion(detail),
            "PART_UPLOAD_ERROR" => TransferError::PartUpload(detail),
            "INVALID_PAYLOAD" => TransferError::InvalidRequest(detail),
            _ => TransferError::Remote(detail),
        };

        let prefix = build(String::new()).to_string();
        let detail = match message.strip_prefix(prefix.as_str()) {
            Some(rest) => rest.to_string(),
            None => message,
        };
        build(detail)
    }
}

/// Why a chunk driver run ended without a stored object
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("part {part_number} failed after {attempts} attempts: {source}")]
    ChunkExhausted {
        part_number: u32,
        attempts: u32,
        source: TransferError,
    },

    #[error("finish failed after {attempts} attempts: {source}")]
    FinishExhausted {
        attempts: u32,
        source: TransferError,
    },

    #[error("fatal transfer error: {0}")]
    Fatal(#[source] TransferError),

    #[error("single-stream transfer failed: {0}")]
    SingleTransferFailed(String),

    #[error("worker task failed: {0}")]
    Worker(String),
}

use thiserror::Error;

use super::models::{ChunkRequest, FailRequest, InitRequest};

const MAX_JOB_ID_LEN: usize = 128;
const MAX_FILENAME_BYTES: usize = 1024;
const MAX_REASON_BYTES: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("job_id must be 1-128 characters of [A-Za-z0-9_.-]")]
    InvalidJobId,
    #[error("source_url must be an http/https url")]
    InvalidSourceUrl,
    #[error("filename must not be empty")]
    EmptyFilename,
    #[error("filename exceeds 1024 bytes")]
    FilenameTooLong,
    #[error("filename '{0}' is not a safe relative key")]
    UnsafeFilename(String),
    #[error("part_number must be at least 1")]
    InvalidPartNumber,
    #[error("range start {start} is past end {end}")]
    InvertedRange { start: u64, end: u64 },
    #[error("reason exceeds 4096 bytes")]
    ReasonTooLong,
}

/// Job ids become ledger key prefixes, so separators are not allowed
pub fn validate_job_id(job_id: &str) -> Result<(), RequestValidationError> {
    let valid = !job_id.is_empty()
        && job_id.len() <= MAX_JOB_ID_LEN
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(RequestValidationError::InvalidJobId)
    }
}

pub fn validate_init(request: &InitRequest) -> Result<(), RequestValidationError> {
    let url = request.source_url.trim();
    let has_host = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'));
    if !has_host {
        return Err(RequestValidationError::InvalidSourceUrl);
    }

    let filename = &request.filename;
    if filename.is_empty() {
        return Err(RequestValidationError::EmptyFilename);
    }
    if filename.len() > MAX_FILENAME_BYTES {
        return Err(RequestValidationError::FilenameTooLong);
    }
    if filename.starts_with('/')
        || filename.split('/').any(|segment| segment == "..")
        || filename.chars().any(char::is_control)
    {
        return Err(RequestValidationError::UnsafeFilename(filename.clone()));
    }

    Ok(())
}

pub fn validate_chunk(request: &ChunkRequest) -> Result<(), RequestValidationError> {
    if request.part_number == 0 {
        return Err(RequestValidationError::InvalidPartNumber);
    }
    if request.start > request.end {
        return Err(RequestValidationError::InvertedRange {
            start: request.start,
            end: request.end,
        });
    }
    Ok(())
}

pub fn validate_fail(request: &FailRequest) -> Result<(), RequestValidationError> {
    if request.reason.len() > MAX_REASON_BYTES {
        return Err(RequestValidationError::ReasonTooLong);
    }
    Ok(())
}

use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use super::validation::RequestValidationError;
use crate::transfer::TransferError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Transfer(e) => match e {
                TransferError::Connection(_)
                | TransferError::RangeFetch(_)
                | TransferError::PartUpload(_)
                | TransferError::Completion(_) => StatusCode::BAD_GATEWAY,
                TransferError::JobNotFound(_) => StatusCode::NOT_FOUND,
                TransferError::NoParts(_) => StatusCode::CONFLICT,
                TransferError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                TransferError::Storage(_) | TransferError::Ledger(_) | TransferError::Remote(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::Transfer(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<RequestValidationError> for ApiError {
    fn from(value: RequestValidationError) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_errors_map_to_statuses() {
        let cases = [
            (TransferError::Connection("x".into()), StatusCode::BAD_GATEWAY),
            (TransferError::RangeFetch("x".into()), StatusCode::BAD_GATEWAY),
            (TransferError::PartUpload("x".into()), StatusCode::BAD_GATEWAY),
            (TransferError::Completion("x".into()), StatusCode::BAD_GATEWAY),
            (TransferError::JobNotFound("x".into()), StatusCode::NOT_FOUND),
            (TransferError::NoParts("x".into()), StatusCode::CONFLICT),
            (TransferError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (TransferError::Remote("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status_code(), expected);
        }
    }

    #[test]
    fn test_code_passes_through() {
        let err = ApiError::from(TransferError::NoParts("job-1".into()));
        assert_eq!(err.code(), "NO_PARTS");
        assert_eq!(err.to_string(), "no parts recorded for job job-1");
    }
}

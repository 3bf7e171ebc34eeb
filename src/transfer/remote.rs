//! `JobService` over the HTTP API, used by the `ingest` command

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::api::models::{ChunkRequest, ErrorResponse, FailRequest, InitRequest};

use super::error::{Result, TransferError};
use super::service::JobService;
use super::types::{ChunkOutcome, ChunkRange, FinishOutcome, InitOutcome, JobStatusReport};

pub struct RemoteJob {
    client: Client,
    base_url: String,
    job_id: String,
}

impl RemoteJob {
    pub fn new(base_url: &str, job_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransferError::Remote(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            job_id: job_id.into(),
        })
    }

    fn url(&self, operation: &str) -> String {
        format!("{}/jobs/{}/{}", self.base_url, self.job_id, operation)
    }

    /// Map a response to `T`, or to the typed error in its `{code, message}` body
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| TransferError::Remote(e.to_string()));
        }
        Err(Self::error_from(response).await)
    }

    async fn error_from(response: Response) -> TransferError {
        let status = response.status();
        match response.bytes().await {
            Ok(body) => match serde_json::from_slice::<ErrorResponse>(&body) {
                Ok(error) => TransferError::from_code(&error.code, error.message),
                Err(_) => TransferError::Remote(format!("HTTP {}", status.as_u16())),
            },
            Err(e) => TransferError::Remote(e.to_string()),
        }
    }
}

fn transport(e: reqwest::Error) -> TransferError {
    TransferError::Remote(e.to_string())
}

#[async_trait]
impl JobService for RemoteJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    async fn init(&self, source_url: &str, filename: &str) -> Result<InitOutcome> {
        let response = self
            .client
            .post(self.url("init"))
            .json(&InitRequest {
                source_url: source_url.to_string(),
                filename: filename.to_string(),
            })
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn process_chunk(&self, range: ChunkRange) -> Result<ChunkOutcome> {
        let response = self
            .client
            .post(self.url("chunks"))
            .json(&ChunkRequest {
                part_number: range.part_number,
                start: range.start,
                end: range.end,
            })
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn finish(&self) -> Result<FinishOutcome> {
        let response = self
            .client
            .post(self.url("finish"))
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn status(&self) -> Result<JobStatusReport> {
        let response = self
            .client
            .get(self.url("status"))
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn mark_failed(&self, reason: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("fail"))
            .json(&FailRequest {
                reason: reason.to_string(),
            })
            .send()
            .await
            .map_err(transport)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }
}

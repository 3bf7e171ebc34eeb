//! HTTP client for probing and fetching source resources

use bytes::Bytes;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, RANGE};
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::config::SourceConfig;
use crate::transfer::types::ChunkRange;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source unreachable: {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected HTTP status {status} from source")]
    Status { status: u16 },

    #[error("Body length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("Failed to read body: {0}")]
    Body(String),

    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_body() || e.is_decode() {
            SourceError::Body(e.to_string())
        } else {
            SourceError::Connection(e.to_string())
        }
    }
}

/// What discovery learned about a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceProbe {
    /// 0 when unknown
    pub total_size: u64,
    pub content_type: Option<String>,
    pub range_capable: bool,
}

/// Source fetcher shared by job actors
#[derive(Clone)]
pub struct SourceClient {
    client: Client,
    /// No total deadline, only a per-read one; full-body copies can run for hours
    stream_client: Client,
}

impl SourceClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| SourceError::Build(e.to_string()))?;

        let stream_client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.request_timeout())
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| SourceError::Build(e.to_string()))?;

        Ok(Self {
            client,
            stream_client,
        })
    }

    /// Discover size, content type and byte-range support.
    ///
    /// `Accept-Ranges: bytes` on HEAD is taken at face value. Otherwise (or when
    /// HEAD gave no length) a one-byte ranged GET decides: 206 means ranges work.
    pub async fn probe(&self, url: &str) -> Result<SourceProbe> {
        let head = self.client.head(url).send().await?;

        let mut probe = SourceProbe {
            total_size: 0,
            content_type: None,
            range_capable: false,
        };

        if head.status().is_success() {
            let headers = head.headers();
            probe.range_capable = header_str(headers, ACCEPT_RANGES)
                .is_some_and(|value| value.eq_ignore_ascii_case("bytes"));
            probe.total_size = header_str(headers, CONTENT_LENGTH)
                .and_then(|value| value.parse().ok())
                .unwrap_or(0);
            probe.content_type = header_str(headers, CONTENT_TYPE).map(String::from);
        } else {
            debug!(url, status = head.status().as_u16(), "HEAD rejected, falling back to range probe");
        }

        if probe.range_capable && probe.total_size > 0 {
            return Ok(probe);
        }

        let response = self.client.get(url).header(RANGE, "bytes=0-0").send().await?;
        let headers = response.headers();

        if probe.content_type.is_none() {
            probe.content_type = header_str(headers, CONTENT_TYPE).map(String::from);
        }

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                probe.range_capable = true;
                if probe.total_size == 0 {
                    probe.total_size = header_str(headers, CONTENT_RANGE)
                        .and_then(parse_content_range)
                        .unwrap_or(0);
                }
            }
            status if status.is_success() => {
                probe.range_capable = false;
                if probe.total_size == 0 {
                    probe.total_size = response_length(headers).unwrap_or(0);
                }
            }
            status => {
                debug!(url, status = status.as_u16(), "Range probe rejected");
            }
        }

        debug!(
            url,
            total_size = probe.total_size,
            range_capable = probe.range_capable,
            "Probed source"
        );
        Ok(probe)
    }

    /// Fetch exactly `range` from the source.
    ///
    /// A 206 must carry exactly the requested bytes. A 200 means the source
    /// ignored the range, so the span is cut out of the full body.
    pub async fn fetch_range(&self, url: &str, range: &ChunkRange) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .header(RANGE, range.header_value())
            .send()
            .await?;

        let status = response.status();
        let expected = range.size();

        match status {
            StatusCode::PARTIAL_CONTENT => {
                let body = response.bytes().await?;
                if body.len() as u64 != expected {
                    return Err(SourceError::LengthMismatch {
                        expected,
                        actual: body.len() as u64,
                    });
                }
                Ok(body)
            }
            StatusCode::OK => {
                let body = response.bytes().await?;
                if (body.len() as u64) <= range.end {
                    return Err(SourceError::LengthMismatch {
                        expected: range.end + 1,
                        actual: body.len() as u64,
                    });
                }
                debug!(
                    part_number = range.part_number,
                    "Source ignored range header, slicing full body"
                );
                Ok(body.slice(range.start as usize..=range.end as usize))
            }
            other => Err(SourceError::Status {
                status: other.as_u16(),
            }),
        }
    }

    /// Start a full GET and hand back the response for streaming
    pub async fn open(&self, url: &str) -> Result<Response> {
        let response = self.stream_client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// `Content-Length` read from the header map. HEAD responses report a body
/// length of zero through `Response::content_length`, so the header is used
/// directly everywhere.
pub fn response_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, CONTENT_LENGTH).and_then(|value| value.parse().ok())
}

/// Complete length from a `Content-Range` value such as `bytes 0-0/1234`
pub fn parse_content_range(value: &str) -> Option<u64> {
    let (unit, rest) = value.trim().split_once(' ')?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return None;
    }
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}

//! Shared fixtures: a mock HTTP source and a recording multipart store
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    http::{
        HeaderMap, StatusCode,
        header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::multipart::{MultipartStore, PartId};
use object_store::path::Path;
use object_store::{MultipartId, ObjectStore, PutPayload, PutResult};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::task::TaskTracker;

use ingestbox::config::{SourceConfig, TransferConfig};
use ingestbox::ledger::JobLedger;
use ingestbox::observability::Metrics;
use ingestbox::source::SourceClient;
use ingestbox::storage::{MemoryMultipartStore, StorageClient};
use ingestbox::transfer::TransferContext;

pub const BIG_SIZE: usize = 50 * 1024 * 1024;
pub const PLAIN_SIZE: usize = 3 * 1024 * 1024 + 17;
/// Delay before a full-body GET of the non-ranged resource starts streaming
pub const PLAIN_DELAY: Duration = Duration::from_millis(500);

/// Deterministic test bytes; the prime period makes a misplaced part visible
pub fn payload(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

#[derive(Clone)]
struct SourceState {
    big: Bytes,
    plain: Bytes,
}

pub struct MockSource {
    pub addr: SocketAddr,
    pub big: Bytes,
    pub plain: Bytes,
}

impl MockSource {
    /// `/big.bin` honours byte ranges
    pub fn ranged_url(&self) -> String {
        format!("http://{}/big.bin", self.addr)
    }

    /// `/plain.bin` ignores `Range` and advertises no range support
    pub fn plain_url(&self) -> String {
        format!("http://{}/plain.bin", self.addr)
    }

    /// Advertises ranges like `/big.bin` but answers every GET with 503
    pub fn unavailable_url(&self) -> String {
        format!("http://{}/unavailable.bin", self.addr)
    }

    /// Advertises ranges, then ignores `Range` and sends the whole body with 200
    pub fn whole_body_url(&self) -> String {
        format!("http://{}/whole.bin", self.addr)
    }

    /// 206 responses one byte shorter than the requested range
    pub fn short_range_url(&self) -> String {
        format!("http://{}/short.bin", self.addr)
    }

    /// 200 responses carrying only the first half of the object
    pub fn clipped_url(&self) -> String {
        format!("http://{}/clipped.bin", self.addr)
    }
}

pub async fn spawn_source() -> MockSource {
    let state = SourceState {
        big: payload(BIG_SIZE),
        plain: payload(PLAIN_SIZE),
    };

    let app = Router::new()
        .route("/big.bin", get(ranged_get).head(ranged_head))
        .route("/plain.bin", get(plain_get).head(plain_head))
        .route(
            "/unavailable.bin",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }).head(ranged_head),
        )
        .route("/whole.bin", get(whole_get).head(ranged_head))
        .route("/short.bin", get(short_get).head(ranged_head))
        .route("/clipped.bin", get(clipped_get).head(ranged_head))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockSource {
        addr,
        big: state.big,
        plain: state.plain,
    }
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn ranged_head(State(state): State<SourceState>) -> impl IntoResponse {
    [
        (ACCEPT_RANGES, "bytes".to_string()),
        (CONTENT_LENGTH, state.big.len().to_string()),
        (CONTENT_TYPE, "application/octet-stream".to_string()),
    ]
}

async fn ranged_get(State(state): State<SourceState>, headers: HeaderMap) -> Response {
    let total = state.big.len();
    let range = headers
        .get(RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_range);

    match range {
        Some((start, end)) if start <= end && end < total => (
            StatusCode::PARTIAL_CONTENT,
            [
                (CONTENT_RANGE, format!("bytes {start}-{end}/{total}")),
                (ACCEPT_RANGES, "bytes".to_string()),
            ],
            state.big.slice(start..=end),
        )
            .into_response(),
        Some(_) => StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
        None => state.big.clone().into_response(),
    }
}

async fn whole_get(State(state): State<SourceState>) -> Response {
    state.big.clone().into_response()
}

async fn short_get(State(state): State<SourceState>, headers: HeaderMap) -> Response {
    let total = state.big.len();
    match headers
        .get(RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_range)
    {
        Some((start, end)) if start < end && end < total => (
            StatusCode::PARTIAL_CONTENT,
            [(CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))],
            state.big.slice(start..end),
        )
            .into_response(),
        _ => StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
    }
}

async fn clipped_get(State(state): State<SourceState>) -> Response {
    state.big.slice(..state.big.len() / 2).into_response()
}

async fn plain_head(State(state): State<SourceState>) -> impl IntoResponse {
    [
        (CONTENT_LENGTH, state.plain.len().to_string()),
        (CONTENT_TYPE, "text/plain".to_string()),
    ]
}

async fn plain_get(State(state): State<SourceState>, headers: HeaderMap) -> Response {
    if !headers.contains_key(RANGE) {
        tokio::time::sleep(PLAIN_DELAY).await;
    }
    ([(CONTENT_TYPE, "text/plain")], state.plain.clone()).into_response()
}

/// Hand-written HTTP/1.1 source without range support. Advertises `total`
/// bytes, then writes the first `sent` of them in `pieces` writes spaced by
/// `pause` and closes the connection.
#[derive(Debug, Clone, Copy)]
pub struct PacedSource {
    pub total: usize,
    pub sent: usize,
    pub pieces: usize,
    pub pause: Duration,
}

impl PacedSource {
    /// Serves the whole body slowly
    pub fn slow(total: usize, pieces: usize, pause: Duration) -> Self {
        Self {
            total,
            sent: total,
            pieces,
            pause,
        }
    }

    /// Closes the connection after `sent` of `total` bytes
    pub fn truncated(total: usize, sent: usize) -> Self {
        Self {
            total,
            sent,
            pieces: 1,
            pause: Duration::ZERO,
        }
    }
}

/// URL of a freshly spawned paced source
pub async fn spawn_paced_source(paced: PacedSource) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_paced(socket, paced));
        }
    });
    format!("http://{addr}/stream.bin")
}

async fn serve_paced(mut socket: TcpStream, paced: PacedSource) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        paced.total
    );
    if socket.write_all(head.as_bytes()).await.is_err() || request.starts_with(b"HEAD") {
        return;
    }

    let body = payload(paced.sent);
    let piece = paced.sent.div_ceil(paced.pieces.max(1)).max(1);
    for chunk in body.chunks(piece) {
        if socket.write_all(chunk).await.is_err() || socket.flush().await.is_err() {
            return;
        }
        tokio::time::sleep(paced.pause).await;
    }
    let _ = socket.shutdown().await;
}

/// Accepts connections and never answers them
pub async fn spawn_silent_source() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}/hang.bin")
}

/// Multipart store over the in-memory backend that hands out
/// `etag-{part}-{seq}` tokens and records the token list of every completion
#[derive(Debug)]
pub struct RecordingMultipartStore {
    inner: MemoryMultipartStore,
    seq: AtomicU64,
    completions: Mutex<Vec<Vec<String>>>,
}

impl RecordingMultipartStore {
    pub fn new(store: Arc<InMemory>) -> Self {
        Self {
            inner: MemoryMultipartStore::new(store),
            seq: AtomicU64::new(0),
            completions: Mutex::new(Vec::new()),
        }
    }

    pub fn completions(&self) -> Vec<Vec<String>> {
        self.completions.lock().unwrap().clone()
    }
}

/// Part number encoded in a recorded token
pub fn token_part(token: &str) -> u32 {
    token.split('-').nth(1).unwrap().parse().unwrap()
}

#[async_trait]
impl MultipartStore for RecordingMultipartStore {
    async fn create_multipart(&self, path: &Path) -> object_store::Result<MultipartId> {
        self.inner.create_multipart(path).await
    }

    async fn put_part(
        &self,
        path: &Path,
        id: &MultipartId,
        part_idx: usize,
        data: PutPayload,
    ) -> object_store::Result<PartId> {
        self.inner.put_part(path, id, part_idx, data).await?;
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        Ok(PartId {
            content_id: format!("etag-{}-{}", part_idx + 1, seq),
        })
    }

    async fn complete_multipart(
        &self,
        path: &Path,
        id: &MultipartId,
        parts: Vec<PartId>,
    ) -> object_store::Result<PutResult> {
        self.completions
            .lock()
            .unwrap()
            .push(parts.iter().map(|part| part.content_id.clone()).collect());
        self.inner.complete_multipart(path, id, parts).await
    }

    async fn abort_multipart(&self, path: &Path, id: &MultipartId) -> object_store::Result<()> {
        self.inner.abort_multipart(path, id).await
    }
}

/// Storage client whose multipart side is recorded
pub fn recording_storage() -> (StorageClient, Arc<RecordingMultipartStore>) {
    let inner = Arc::new(InMemory::new());
    let recorder = Arc::new(RecordingMultipartStore::new(inner.clone()));
    let storage = StorageClient::from_parts(
        inner as Arc<dyn ObjectStore>,
        recorder.clone() as Arc<dyn MultipartStore>,
    );
    (storage, recorder)
}

pub fn test_transfer_config() -> TransferConfig {
    TransferConfig {
        progress_interval_ms: 50,
        ..TransferConfig::default()
    }
}

pub fn transfer_context(dir: &TempDir, storage: StorageClient) -> Arc<TransferContext> {
    Arc::new(TransferContext {
        ledger: JobLedger::open(dir.path().join("ledger")).unwrap(),
        storage,
        source: SourceClient::new(&SourceConfig::default()).unwrap(),
        settings: test_transfer_config(),
        tasks: TaskTracker::new(),
        metrics: Arc::new(Metrics::new()),
    })
}

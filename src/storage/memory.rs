//! Multipart uploads for the in-memory backend
//!
//! `InMemory` only accepts parts in ascending order. Chunk workers finish in
//! any order, so parts are buffered here by index and written as one object
//! on completion.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use object_store::memory::InMemory;
use object_store::multipart::{MultipartStore, PartId};
use object_store::path::Path;
use object_store::{MultipartId, ObjectStore, PutPayload, PutResult};

const STORE: &str = "MemoryMultipart";

#[derive(Debug, Default)]
struct PendingUpload {
    parts: BTreeMap<usize, Bytes>,
}

#[derive(Debug)]
pub struct MemoryMultipartStore {
    store: Arc<InMemory>,
    uploads: Mutex<HashMap<MultipartId, PendingUpload>>,
    next_id: AtomicU64,
    next_part: AtomicU64,
}

impl MemoryMultipartStore {
    pub fn new(store: Arc<InMemory>) -> Self {
        Self {
            store,
            uploads: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            next_part: AtomicU64::new(1),
        }
    }

    fn uploads(&self) -> MutexGuard<'_, HashMap<MultipartId, PendingUpload>> {
        self.uploads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Uploads created but neither completed nor aborted
    pub fn open_uploads(&self) -> usize {
        self.uploads().len()
    }
}

fn unknown_upload(path: &Path, id: &MultipartId) -> object_store::Error {
    object_store::Error::NotFound {
        path: path.to_string(),
        source: format!("no open multipart upload {id}").into(),
    }
}

#[async_trait]
impl MultipartStore for MemoryMultipartStore {
    async fn create_multipart(&self, _path: &Path) -> object_store::Result<MultipartId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        self.uploads().insert(id.clone(), PendingUpload::default());
        Ok(id)
    }

    async fn put_part(
        &self,
        path: &Path,
        id: &MultipartId,
        part_idx: usize,
        data: PutPayload,
    ) -> object_store::Result<PartId> {
        let mut uploads = self.uploads();
        let upload = uploads
            .get_mut(id)
            .ok_or_else(|| unknown_upload(path, id))?;
        upload.parts.insert(part_idx, Bytes::from(data));

        let seq = self.next_part.fetch_add(1, Ordering::Relaxed);
        Ok(PartId {
            content_id: format!("{id}-{}-{seq}", part_idx + 1),
        })
    }

    /// Parts are assembled by position; `parts[i]` stands for index `i`
    async fn complete_multipart(
        &self,
        path: &Path,
        id: &MultipartId,
        parts: Vec<PartId>,
    ) -> object_store::Result<PutResult> {
        let upload = self
            .uploads()
            .remove(id)
            .ok_or_else(|| unknown_upload(path, id))?;

        let mut body = BytesMut::new();
        for idx in 0..parts.len() {
            let Some(part) = upload.parts.get(&idx) else {
                let missing = object_store::Error::Generic {
                    store: STORE,
                    source: format!("part {} was never uploaded", idx + 1).into(),
                };
                // Keep the upload open so the caller can supply the part and retry
                self.uploads().insert(id.clone(), upload);
                return Err(missing);
            };
            body.extend_from_slice(part);
        }

        self.store.put(path, body.freeze().into()).await
    }

    async fn abort_multipart(&self, _path: &Path, id: &MultipartId) -> object_store::Result<()> {
        self.uploads().remove(id);
        Ok(())
    }
}

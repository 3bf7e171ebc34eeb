//! Object storage abstraction for ingested objects
//! Uses Apache Arrow object_store crate

mod memory;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::memory::InMemory;
use object_store::multipart::{MultipartStore, PartId};
use object_store::{Attribute, Attributes, ObjectStore, path::Path as StoragePath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use memory::MemoryMultipartStore;

use crate::config::{StorageConfig, StorageProvider};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid part number {0}: parts are numbered from 1")]
    InvalidPart(u32),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata returned after a write completes
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
}

/// Result of `head`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
}

/// Identifies an open multipart upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartHandle {
    pub key: String,
    pub upload_id: String,
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    multipart: Arc<dyn MultipartStore>,
}

impl StorageClient {
    /// Create new storage client with any backend that supports multipart uploads
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: ObjectStore + MultipartStore,
    {
        Self {
            store: store.clone(),
            multipart: store,
        }
    }

    /// Create from separate handles, e.g. when the multipart side is wrapped
    pub fn from_parts(store: Arc<dyn ObjectStore>, multipart: Arc<dyn MultipartStore>) -> Self {
        Self { store, multipart }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemory::new());
        let multipart = Arc::new(MemoryMultipartStore::new(store.clone()));
        Self::from_parts(store, multipart)
    }

    /// Build the configured backend
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.provider {
            StorageProvider::Memory => Ok(Self::in_memory()),
            StorageProvider::S3 => {
                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(&config.bucket)
                    .with_allow_http(config.allow_http);

                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(access_key) = &config.access_key {
                    builder = builder.with_access_key_id(access_key);
                }
                if let Some(secret_key) = &config.secret_key {
                    builder = builder.with_secret_access_key(secret_key);
                }

                Ok(Self::new(Arc::new(builder.build()?)))
            }
        }
    }

    /// Size and etag of an object, `None` if absent
    pub async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(meta) => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: meta.size as u64,
                etag: meta.e_tag,
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Download from storage
    pub async fn download(&self, key: &str) -> Result<Bytes> {
        let path = StoragePath::from(key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = result.bytes().await?;
        tracing::debug!(key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes)
    }

    /// Streaming writer for a whole object. Small bodies go out as one put,
    /// larger ones as a background multipart upload.
    pub fn writer(&self, key: &str, content_type: Option<&str>) -> BufWriter {
        let writer = BufWriter::new(self.store.clone(), StoragePath::from(key));

        match content_type {
            Some(content_type) => {
                let mut attributes = Attributes::new();
                attributes.insert(Attribute::ContentType, content_type.to_string().into());
                writer.with_attributes(attributes)
            }
            None => writer,
        }
    }

    pub async fn create_multipart(&self, key: &str) -> Result<MultipartHandle> {
        let path = StoragePath::from(key);
        let upload_id = self.multipart.create_multipart(&path).await?;

        tracing::debug!(key, upload_id = %upload_id, "Created multipart upload");

        Ok(MultipartHandle {
            key: key.to_string(),
            upload_id,
        })
    }

    /// Rebuild a handle for an upload created earlier
    pub fn resume_multipart(&self, key: &str, upload_id: &str) -> MultipartHandle {
        MultipartHandle {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        }
    }

    /// Upload one part and return its completion token
    pub async fn upload_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        let part_idx = part_number
            .checked_sub(1)
            .ok_or(StorageError::InvalidPart(part_number))? as usize;
        let path = StoragePath::from(handle.key.as_str());

        let part = self
            .multipart
            .put_part(&path, &handle.upload_id, part_idx, data.into())
            .await?;

        Ok(part.content_id)
    }

    /// Complete an upload. `tokens` must be ordered by part number starting at 1.
    pub async fn complete_multipart(
        &self,
        handle: &MultipartHandle,
        tokens: Vec<String>,
    ) -> Result<UploadMetadata> {
        let path = StoragePath::from(handle.key.as_str());
        let parts = tokens
            .into_iter()
            .map(|content_id| PartId { content_id })
            .collect();

        let result = self
            .multipart
            .complete_multipart(&path, &handle.upload_id, parts)
            .await?;

        tracing::info!(key = %handle.key, "Completed multipart upload");

        Ok(UploadMetadata {
            key: handle.key.clone(),
            etag: result.e_tag,
        })
    }

    pub async fn abort_multipart(&self, handle: &MultipartHandle) -> Result<()> {
        let path = StoragePath::from(handle.key.as_str());
        self.multipart
            .abort_multipart(&path, &handle.upload_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_multipart_roundtrip() {
        let storage = StorageClient::in_memory();
        let handle = storage.create_multipart("videos/a.bin").await.unwrap();

        let mut tokens = Vec::new();
        for (part_number, chunk) in [(1, &b"hello "[..]), (2, &b"world"[..])] {
            let token = storage
                .upload_part(&handle, part_number, Bytes::from_static(chunk))
                .await
                .unwrap();
            tokens.push(token);
        }

        storage.complete_multipart(&handle, tokens).await.unwrap();

        let info = storage.head("videos/a.bin").await.unwrap().unwrap();
        assert_eq!(info.size, 11);
        assert_eq!(
            storage.download("videos/a.bin").await.unwrap(),
            Bytes::from_static(b"hello world")
        );
    }

    #[tokio::test]
    async fn test_parts_uploaded_out_of_order() {
        let storage = StorageClient::in_memory();
        let handle = storage.create_multipart("shuffled.bin").await.unwrap();

        let mut tokens = vec![String::new(); 3];
        for (part_number, chunk) in [(3, &b"c"[..]), (1, &b"a"[..]), (2, &b"b"[..])] {
            tokens[part_number as usize - 1] = storage
                .upload_part(&handle, part_number, Bytes::from_static(chunk))
                .await
                .unwrap();
        }

        storage.complete_multipart(&handle, tokens).await.unwrap();
        assert_eq!(
            storage.download("shuffled.bin").await.unwrap(),
            Bytes::from_static(b"abc")
        );
    }

    #[tokio::test]
    async fn test_aborted_upload_rejects_parts() {
        let storage = StorageClient::in_memory();
        let handle = storage.create_multipart("gone.bin").await.unwrap();
        storage.abort_multipart(&handle).await.unwrap();

        let result = storage
            .upload_part(&handle, 1, Bytes::from_static(b"late"))
            .await;
        assert!(matches!(result, Err(StorageError::ObjectStoreError(_))));
    }

    #[tokio::test]
    async fn test_upload_part_rejects_part_zero() {
        let storage = StorageClient::in_memory();
        let handle = storage.create_multipart("a").await.unwrap();

        let result = storage.upload_part(&handle, 0, Bytes::new()).await;
        assert!(matches!(result, Err(StorageError::InvalidPart(0))));
    }

    #[tokio::test]
    async fn test_head_missing_is_none() {
        let storage = StorageClient::in_memory();
        assert!(storage.head("missing").await.unwrap().is_none());
        assert!(matches!(
            storage.download("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_writer_streams_object() {
        let storage = StorageClient::in_memory();
        let mut writer = storage.writer("single.txt", Some("text/plain"));

        writer.write_all(b"first,").await.unwrap();
        writer.write_all(b"second").await.unwrap();
        writer.shutdown().await.unwrap();

        assert_eq!(
            storage.download("single.txt").await.unwrap(),
            Bytes::from_static(b"first,second")
        );
    }
}

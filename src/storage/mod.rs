//! Blob storage behind artifact pointers
//!
//! The registry only records pointers; the tracked-job runner and retention
//! sweep use a [`BlobStore`] to write and delete the bytes they point at. The
//! variant is picked once from configuration.

mod database;
mod filesystem;
mod object;

pub use database::DatabaseBlobs;
pub use filesystem::FilesystemBlobs;
pub use object::ObjectStoreBlobs;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::artifacts::StorageBackend;
use crate::config::{StorageConfig, StorageProvider};
use crate::store::{LedgerStore, StoreError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database blob error: {0}")]
    Database(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid storage pointer: {0}")]
    InvalidPointer(String),

    #[error("Blob of {size} bytes exceeds inline limit of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("Blocking task failed: {0}")]
    Task(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Byte storage addressed by opaque pointer strings.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend recorded on artifacts written through this store.
    fn backend(&self) -> StorageBackend;

    async fn put(&self, pointer: &str, data: Bytes) -> Result<()>;

    async fn get(&self, pointer: &str) -> Result<Bytes>;

    /// Deleting a missing blob succeeds.
    async fn delete(&self, pointer: &str) -> Result<()>;

    async fn exists(&self, pointer: &str) -> Result<bool>;
}

/// Builds tenant-namespaced pointers: `{bucket}/{prefix}/{tenant}/{project}/{object}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLayout {
    bucket: String,
    prefix: String,
}

impl BlobLayout {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into().trim_matches('/').to_string(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn pointer(&self, tenant_id: &str, project_id: &str, object: &str) -> Result<String> {
        let object = object.trim_start_matches('/');
        if object.is_empty() || object.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(StorageError::InvalidPointer(object.to_string()));
        }

        let mut pointer = self.bucket.clone();
        for segment in [self.prefix.as_str(), tenant_id, project_id, object] {
            if !segment.is_empty() {
                pointer.push('/');
                pointer.push_str(segment);
            }
        }
        Ok(pointer)
    }
}

impl From<&StorageConfig> for BlobLayout {
    fn from(config: &StorageConfig) -> Self {
        BlobLayout::new(&config.bucket, &config.prefix)
    }
}

/// Split a pointer into safe relative segments.
pub(crate) fn pointer_segments(pointer: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = pointer.split('/').collect();
    if pointer.is_empty()
        || pointer.starts_with('/')
        || segments
            .iter()
            .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
    {
        return Err(StorageError::InvalidPointer(pointer.to_string()));
    }
    Ok(segments)
}

/// Construct the configured blob store.
pub fn from_config(config: &StorageConfig, store: Arc<LedgerStore>) -> Result<Arc<dyn BlobStore>> {
    let blobs: Arc<dyn BlobStore> = match config.provider {
        StorageProvider::Memory => Arc::new(ObjectStoreBlobs::in_memory(&config.bucket)),
        StorageProvider::S3 => Arc::new(ObjectStoreBlobs::s3(config)?),
        StorageProvider::Local => Arc::new(FilesystemBlobs::new(&config.root)),
        StorageProvider::Database => {
            Arc::new(DatabaseBlobs::new(store, config.max_inline_bytes.as_u64()))
        }
    };
    tracing::info!(provider = ?config.provider, bucket = %config.bucket, "Blob store ready");
    Ok(blobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_pointer() {
        let layout = BlobLayout::new("workledger", "/artifacts/");
        assert_eq!(
            layout.pointer("acme", "claims", "raw/doc.pdf").unwrap(),
            "workledger/artifacts/acme/claims/raw/doc.pdf"
        );

        let bare = BlobLayout::new("bucket", "");
        assert_eq!(bare.pointer("t", "p", "x").unwrap(), "bucket/t/p/x");
    }

    #[test]
    fn test_layout_rejects_traversal() {
        let layout = BlobLayout::new("b", "a");
        assert!(layout.pointer("t", "p", "../other/x").is_err());
        assert!(layout.pointer("t", "p", "").is_err());
    }

    #[test]
    fn test_pointer_segments() {
        assert_eq!(pointer_segments("b/t/p/x").unwrap(), vec!["b", "t", "p", "x"]);
        assert!(pointer_segments("/etc/passwd").is_err());
        assert!(pointer_segments("b/../x").is_err());
        assert!(pointer_segments("b//x").is_err());
    }
}

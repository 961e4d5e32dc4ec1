use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::{ObjectStore, path::Path as StoragePath};

use crate::artifacts::StorageBackend;
use crate::config::StorageConfig;

use super::{BlobStore, Result, StorageError};

/// Blobs in an `object_store` bucket. Pointers carry the bucket name as their
/// first segment; the remainder is the object key.
#[derive(Clone)]
pub struct ObjectStoreBlobs {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStoreBlobs {
    /// Wrap any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into().trim_matches('/').to_string(),
        }
    }

    /// In-memory bucket for tests and local development
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()), bucket)
    }

    /// S3 (or S3-compatible) bucket. Credentials come from the environment.
    pub fn s3(config: &StorageConfig) -> Result<Self> {
        let mut builder = AmazonS3Builder::new().with_bucket_name(&config.bucket);
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(access_key) = &config.access_key {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = &config.secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }

        Ok(Self::new(Arc::new(builder.build()?), &config.bucket))
    }

    fn path(&self, pointer: &str) -> Result<StoragePath> {
        let key = pointer
            .strip_prefix(self.bucket.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| StorageError::InvalidPointer(pointer.to_string()))?;
        super::pointer_segments(key)?;
        Ok(StoragePath::from(key))
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobs {
    fn backend(&self) -> StorageBackend {
        StorageBackend::ObjectStore
    }

    async fn put(&self, pointer: &str, data: Bytes) -> Result<()> {
        let path = self.path(pointer)?;
        let size = data.len();
        self.store.put(&path, data.into()).await?;
        tracing::debug!(pointer, size, "Stored object");
        Ok(())
    }

    async fn get(&self, pointer: &str) -> Result<Bytes> {
        let path = self.path(pointer)?;
        match self.store.get(&path).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => {
                Err(StorageError::NotFound(pointer.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, pointer: &str) -> Result<()> {
        let path = self.path(pointer)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, pointer: &str) -> Result<bool> {
        let path = self.path(pointer)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let blobs = ObjectStoreBlobs::in_memory("bucket");
        let pointer = "bucket/artifacts/t1/p1/a.json";

        blobs.put(pointer, Bytes::from_static(b"{}")).await.unwrap();
        assert!(blobs.exists(pointer).await.unwrap());
        assert_eq!(blobs.get(pointer).await.unwrap(), Bytes::from_static(b"{}"));

        blobs.delete(pointer).await.unwrap();
        assert!(!blobs.exists(pointer).await.unwrap());
        assert!(matches!(
            blobs.get(pointer).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
        blobs.delete(pointer).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_foreign_bucket() {
        let blobs = ObjectStoreBlobs::in_memory("bucket");
        let err = blobs
            .put("other/t1/p1/a.json", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPointer(_)));
        assert!(blobs.exists("bucketx/t1/a").await.is_err());
    }
}

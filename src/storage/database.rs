use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::artifacts::StorageBackend;
use crate::store::LedgerStore;

use super::{BlobStore, Result, StorageError};

/// Small blobs stored inline in the ledger's `blobs` partition.
#[derive(Clone)]
pub struct DatabaseBlobs {
    store: Arc<LedgerStore>,
    max_inline_bytes: u64,
}

impl DatabaseBlobs {
    pub fn new(store: Arc<LedgerStore>, max_inline_bytes: u64) -> Self {
        Self {
            store,
            max_inline_bytes,
        }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&LedgerStore) -> crate::store::Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
            .map_err(StorageError::from)
    }
}

#[async_trait]
impl BlobStore for DatabaseBlobs {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Database
    }

    async fn put(&self, pointer: &str, data: Bytes) -> Result<()> {
        let size = data.len() as u64;
        if size > self.max_inline_bytes {
            return Err(StorageError::TooLarge {
                size,
                max: self.max_inline_bytes,
            });
        }
        let pointer = pointer.to_string();
        self.blocking(move |store| store.put_blob(&pointer, &data)).await
    }

    async fn get(&self, pointer: &str) -> Result<Bytes> {
        let key = pointer.to_string();
        self.blocking(move |store| store.get_blob(&key))
            .await?
            .map(Bytes::from)
            .ok_or_else(|| StorageError::NotFound(pointer.to_string()))
    }

    async fn delete(&self, pointer: &str) -> Result<()> {
        let pointer = pointer.to_string();
        self.blocking(move |store| store.delete_blob(&pointer)).await
    }

    async fn exists(&self, pointer: &str) -> Result<bool> {
        let pointer = pointer.to_string();
        self.blocking(move |store| store.blob_exists(&pointer)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_inline_blobs_and_cap() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(LedgerStore::open(temp_dir.path().join("ledger")).unwrap());
        let blobs = DatabaseBlobs::new(store, 8);

        blobs.put("b/t/p/small", Bytes::from_static(b"tiny")).await.unwrap();
        assert_eq!(blobs.get("b/t/p/small").await.unwrap(), Bytes::from_static(b"tiny"));

        let err = blobs
            .put("b/t/p/big", Bytes::from_static(b"much too large"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { size: 14, max: 8 }));

        blobs.delete("b/t/p/small").await.unwrap();
        assert!(!blobs.exists("b/t/p/small").await.unwrap());
        assert!(matches!(
            blobs.get("b/t/p/small").await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }
}

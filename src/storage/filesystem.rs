use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::artifacts::StorageBackend;

use super::{BlobStore, Result, StorageError, pointer_segments};

/// Blobs as files under a root directory, one path segment per pointer segment.
#[derive(Debug, Clone)]
pub struct FilesystemBlobs {
    root: PathBuf,
}

impl FilesystemBlobs {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path(&self, pointer: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in pointer_segments(pointer)? {
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobs {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Filesystem
    }

    async fn put(&self, pointer: &str, data: Bytes) -> Result<()> {
        let path = self.path(pointer)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write beside the target and rename so readers never see a partial file.
        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        tokio::fs::write(&staging, &data).await?;
        tokio::fs::rename(&staging, &path).await?;

        tracing::debug!(pointer, size = data.len(), "Stored file blob");
        Ok(())
    }

    async fn get(&self, pointer: &str) -> Result<Bytes> {
        match tokio::fs::read(self.path(pointer)?).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(pointer.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, pointer: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(pointer)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, pointer: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(pointer)?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_under_root() {
        let temp_dir = TempDir::new().unwrap();
        let blobs = FilesystemBlobs::new(temp_dir.path());
        let pointer = "bucket/artifacts/t1/p1/report.json";

        blobs.put(pointer, Bytes::from_static(b"report")).await.unwrap();
        assert!(temp_dir.path().join("bucket/artifacts/t1/p1/report.json").exists());
        assert_eq!(blobs.get(pointer).await.unwrap(), Bytes::from_static(b"report"));

        blobs.delete(pointer).await.unwrap();
        assert!(!blobs.exists(pointer).await.unwrap());
        blobs.delete(pointer).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escape() {
        let temp_dir = TempDir::new().unwrap();
        let blobs = FilesystemBlobs::new(temp_dir.path());
        assert!(matches!(
            blobs.put("../escape", Bytes::new()).await.unwrap_err(),
            StorageError::InvalidPointer(_)
        ));
        assert!(blobs.get("/etc/passwd").await.is_err());
    }
}

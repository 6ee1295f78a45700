//! Filesystem storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::StorageBackend;
use crate::error::{AppError, Result};

/// Stores each key as one file directly under `base_path`
pub struct FilesystemStorage {
    base_path: PathBuf,
}

impl FilesystemStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Create the base directory if needed.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    fn key_to_path(&self, key: &str) -> Result<PathBuf> {
        let safe = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\', '\0']);
        if !safe {
            return Err(AppError::Storage(format!("Invalid storage key: {:?}", key)));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl StorageBackend for FilesystemStorage {
    async fn put(&self, key: &str, content: Bytes) -> Result<()> {
        let path = self.key_to_path(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create {}: {}", key, e)))?;
        file.write_all(&content)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write {}: {}", key, e)))?;
        file.sync_all().await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.key_to_path(key)?;
        match fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound("File not found".to_string()))
            }
            Err(e) => Err(AppError::Storage(format!("Failed to read {}: {}", key, e))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_to_path(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete {}: {}", key, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());

        storage
            .put("doc.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert!(storage.exists("doc.txt").await.unwrap());
        assert_eq!(storage.get("doc.txt").await.unwrap(), Bytes::from_static(b"hello"));

        storage.delete("doc.txt").await.unwrap();
        assert!(!storage.exists("doc.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        assert!(matches!(
            storage.get("nope.pdf").await,
            Err(AppError::NotFound(_))
        ));
        assert!(storage.delete("nope.pdf").await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("uploads"));
        assert!(matches!(
            storage.put("../escape.txt", Bytes::new()).await,
            Err(AppError::Storage(_))
        ));
        assert!(storage.get("..").await.is_err());
    }

    #[tokio::test]
    async fn test_init_creates_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("public").join("uploads");
        FilesystemStorage::new(&base).init().await.unwrap();
        assert!(base.is_dir());
    }
}

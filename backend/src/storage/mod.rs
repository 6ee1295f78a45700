//! File storage for uploaded document bodies.

pub mod filesystem;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::error::Result;

/// Storage backend trait
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store content under `key`, replacing anything already there
    async fn put(&self, key: &str, content: Bytes) -> Result<()>;

    /// Retrieve content by key. A missing key is `NotFound`.
    async fn get(&self, key: &str) -> Result<Bytes>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Fresh storage key for an upload, keeping the original file extension.
pub fn document_key(file_name: &str) -> String {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext.to_ascii_lowercase()),
        None => Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_key_keeps_extension() {
        let key = document_key("Annual Report.PDF");
        assert!(key.ends_with(".pdf"));
        assert!(Uuid::parse_str(key.trim_end_matches(".pdf")).is_ok());
    }

    #[test]
    fn test_document_key_without_usable_extension() {
        assert!(Uuid::parse_str(&document_key("README")).is_ok());
        assert!(Uuid::parse_str(&document_key("../../etc/passwd")).is_ok());
        assert!(Uuid::parse_str(&document_key("weird.t@r")).is_ok());
    }

    #[test]
    fn test_document_keys_are_unique() {
        assert_ne!(document_key("a.txt"), document_key("a.txt"));
    }
}

//! Document service: uploads, metadata, search and download links.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::document::{Document, DocumentChanges, DocumentFilter, NewDocument};
use crate::repositories::DocumentRepository;
use crate::services::token_service::TokenService;
use crate::storage::{document_key, StorageBackend};

/// Upload request after multipart parsing
#[derive(Debug, Clone)]
pub struct UploadDocument {
    pub owner: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub tag: String,
    pub file_name: String,
    pub content: Bytes,
}

/// A page of documents with the total number of matches
#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub items: Vec<Document>,
    pub total: i64,
}

/// Time-limited public download URL
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DownloadLink {
    pub url: String,
    /// Seconds until the link stops working
    pub expires_in: i64,
}

pub struct DocumentService {
    documents: Arc<dyn DocumentRepository>,
    storage: Arc<dyn StorageBackend>,
    tokens: Arc<TokenService>,
    base_url: String,
    download_ttl_secs: i64,
}

impl DocumentService {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        storage: Arc<dyn StorageBackend>,
        tokens: Arc<TokenService>,
        base_url: impl Into<String>,
        download_ttl_secs: i64,
    ) -> Self {
        Self {
            documents,
            storage,
            tokens,
            base_url: base_url.into(),
            download_ttl_secs,
        }
    }

    /// Store the file, then insert its row. The file is removed again if the
    /// insert fails.
    pub async fn upload(&self, upload: UploadDocument) -> Result<Document> {
        let key = document_key(&upload.file_name);
        let size = upload.content.len();
        self.storage.put(&key, upload.content).await?;

        let created = self
            .documents
            .create(NewDocument {
                title: upload.title,
                description: upload.description,
                tag: upload.tag,
                storage_path: key.clone(),
                uploaded_by: upload.owner,
            })
            .await;

        match created {
            Ok(document) => {
                tracing::info!(
                    document_id = %document.id,
                    owner = %document.uploaded_by,
                    size_bytes = size,
                    "Document uploaded"
                );
                Ok(document)
            }
            Err(err) => {
                if let Err(cleanup) = self.storage.delete(&key).await {
                    tracing::warn!(key = %key, error = %cleanup, "Failed to remove orphaned upload");
                }
                Err(err.into())
            }
        }
    }

    /// Newest first.
    pub async fn list(&self, page: u32, per_page: u32) -> Result<DocumentPage> {
        let (limit, offset) = window(page, per_page);
        let (items, total) = self.documents.list(limit, offset).await?;
        Ok(DocumentPage { items, total })
    }

    pub async fn get(&self, id: Uuid) -> Result<Document> {
        self.documents
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn update_metadata(&self, id: Uuid, changes: DocumentChanges) -> Result<Document> {
        if changes.is_empty() {
            return Err(AppError::Validation(
                "At least one of title, description or tag must be provided".to_string(),
            ));
        }
        let document = self
            .documents
            .update(id, changes)
            .await?
            .ok_or_else(|| not_found(id))?;

        tracing::info!(document_id = %id, "Document metadata updated");
        Ok(document)
    }

    /// Remove the row, then the file. A file that cannot be removed is only logged.
    pub async fn delete(&self, id: Uuid) -> Result<Document> {
        self.get(id).await?;
        let document = self
            .documents
            .delete(id)
            .await?
            .ok_or_else(|| not_found(id))?;

        if let Err(err) = self.storage.delete(&document.storage_path).await {
            tracing::warn!(
                document_id = %id,
                key = %document.storage_path,
                error = %err,
                "Document row deleted but file removal failed"
            );
        }

        tracing::info!(document_id = %id, "Document deleted");
        Ok(document)
    }

    pub async fn search(&self, filter: &DocumentFilter, page: u32, per_page: u32) -> Result<DocumentPage> {
        let (limit, offset) = window(page, per_page);
        let (items, total) = self.documents.search(filter, limit, offset).await?;
        Ok(DocumentPage { items, total })
    }

    pub async fn generate_download_link(&self, id: Uuid) -> Result<DownloadLink> {
        let document = self.get(id).await?;
        let token = self
            .tokens
            .sign_download(document.id)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(DownloadLink {
            url: format!("{}/api/v1/documents/download/{}", self.base_url, token),
            expires_in: self.download_ttl_secs,
        })
    }

    /// Resolve a download token to the document and its bytes.
    pub async fn open_download(&self, token: &str) -> Result<(Document, Bytes)> {
        let claims = self.tokens.verify_download(token).map_err(|e| {
            tracing::warn!(error = %e, "Rejected download token");
            AppError::Authentication("Invalid or expired download link".to_string())
        })?;

        let document = self.get(claims.document_id).await?;
        let content = self.storage.get(&document.storage_path).await?;
        Ok((document, content))
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Document {} not found", id))
}

/// Clamp 1-based paging input into a SQL limit/offset pair.
fn window(page: u32, per_page: u32) -> (i64, i64) {
    let per_page = per_page.clamp(1, 100) as i64;
    let page = page.max(1) as i64;
    (per_page, (page - 1) * per_page)
}

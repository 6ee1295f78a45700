//! Document metadata model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Document entity. The file itself lives in the storage backend under
/// `storage_path`.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub tag: String,
    #[serde(skip_serializing)]
    pub storage_path: String,
    /// Owner; never changes after upload
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.uploaded_by == user_id
    }

    /// Attachment name: title plus the stored file's extension.
    pub fn download_filename(&self) -> String {
        match std::path::Path::new(&self.storage_path)
            .extension()
            .and_then(|e| e.to_str())
        {
            Some(ext) => format!("{}.{}", self.title, ext),
            None => self.title.clone(),
        }
    }
}

/// Fields required to insert a document row
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub description: Option<String>,
    pub tag: String,
    pub storage_path: String,
    pub uploaded_by: Uuid,
}

/// Partial metadata update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct DocumentChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tag: Option<String>,
}

impl DocumentChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.tag.is_none()
    }
}

/// Search filter; every present criterion must match.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Substring of the title
    pub title: Option<String>,
    /// Substring of the tag
    pub tag: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl DocumentFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        self.title.as_deref().map_or(true, |t| doc.title.contains(t))
            && self.tag.as_deref().map_or(true, |t| doc.tag.contains(t))
            && self.uploaded_by.map_or(true, |u| doc.uploaded_by == u)
            && self.start_date.map_or(true, |d| doc.created_at >= d)
            && self.end_date.map_or(true, |d| doc.created_at <= d)
    }
}

//! Persistence seams.
//!
//! Services receive these traits as `Arc<dyn ...>` so the same logic runs
//! against PostgreSQL in production and the in-memory store in tests.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::document::{Document, DocumentChanges, DocumentFilter, NewDocument};
use crate::models::role::{Action, DocumentPermission, PermissionFlags, Role, RoleName};
use crate::models::user::{NewUser, User};

/// Failure reported by a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// A unique constraint rejected the write
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Stored data breaks a model invariant (e.g. two roles for one user)
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// The store could not be reached or the statement failed
    #[error("{0}")]
    Backend(String),
}

pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return RepositoryError::UniqueViolation(
                    db_err.constraint().unwrap_or("unknown").to_string(),
                );
            }
        }
        RepositoryError::Backend(err.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::UniqueViolation(constraint) => {
                AppError::Conflict(format!("Duplicate value ({})", constraint))
            }
            other => AppError::Repository(other.to_string()),
        }
    }
}

/// Identity store: users, their role assignment and refresh-token state.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    async fn exists_by_username_or_email(&self, username: &str, email: &str) -> RepoResult<bool>;

    async fn find_role_by_name(&self, name: RoleName) -> RepoResult<Option<Role>>;

    /// The user's single role. More than one assigned role is an `Integrity` error.
    async fn find_role_by_user_id(&self, user_id: Uuid) -> RepoResult<Option<Role>>;

    /// Insert the user and its role assignment as one atomic unit.
    async fn create_with_role(&self, new_user: NewUser, role_id: Uuid) -> RepoResult<User>;

    /// Overwrite the stored refresh token unconditionally.
    async fn set_refresh_token(&self, user_id: Uuid, token: Option<&str>) -> RepoResult<()>;

    /// Replace the stored refresh token only if it still equals `expected`.
    /// Returns whether the swap happened.
    async fn replace_refresh_token(
        &self,
        user_id: Uuid,
        expected: &str,
        replacement: &str,
    ) -> RepoResult<bool>;

    /// Cheap connectivity check.
    async fn ping(&self) -> RepoResult<()>;
}

/// Role/permission catalog plus the per-document override table.
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// The user's single role. More than one assigned role is an `Integrity` error.
    async fn find_user_role(&self, user_id: Uuid) -> RepoResult<Option<Role>>;

    async fn find_document(&self, document_id: Uuid) -> RepoResult<Option<Document>>;

    /// Whether a grant links `role_id` to the catalog entry for `action`.
    async fn role_has_permission(&self, role_id: Uuid, action: Action) -> RepoResult<bool>;

    async fn list_role_actions(&self, role_id: Uuid) -> RepoResult<Vec<Action>>;

    async fn find_document_permission(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> RepoResult<Option<DocumentPermission>>;

    async fn upsert_document_permission(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        flags: PermissionFlags,
    ) -> RepoResult<DocumentPermission>;

    async fn delete_document_permission(&self, user_id: Uuid, document_id: Uuid)
        -> RepoResult<bool>;
}

/// Document metadata store.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn create(&self, new_document: NewDocument) -> RepoResult<Document>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Document>>;

    /// Newest first, with the total row count.
    async fn list(&self, limit: i64, offset: i64) -> RepoResult<(Vec<Document>, i64)>;

    /// Newest first, with the total count of matching rows.
    async fn search(
        &self,
        filter: &DocumentFilter,
        limit: i64,
        offset: i64,
    ) -> RepoResult<(Vec<Document>, i64)>;

    async fn update(&self, id: Uuid, changes: DocumentChanges) -> RepoResult<Option<Document>>;

    /// Returns the deleted row, if there was one.
    async fn delete(&self, id: Uuid) -> RepoResult<Option<Document>>;
}

/// The set of stores the services are wired against.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub permissions: Arc<dyn PermissionRepository>,
    pub documents: Arc<dyn DocumentRepository>,
}

impl Repositories {
    /// PostgreSQL-backed stores sharing one pool.
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self {
            users: store.clone(),
            permissions: store.clone(),
            documents: store,
        }
    }

    /// In-memory stores sharing one [`memory::InMemoryStore`].
    pub fn in_memory(store: Arc<memory::InMemoryStore>) -> Self {
        Self {
            users: store.clone(),
            permissions: store.clone(),
            documents: store,
        }
    }
}

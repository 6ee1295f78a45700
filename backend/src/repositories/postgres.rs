//! PostgreSQL implementation of the repository traits.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    DocumentRepository, PermissionRepository, RepoResult, RepositoryError, UserRepository,
};
use crate::models::document::{Document, DocumentChanges, DocumentFilter, NewDocument};
use crate::models::role::{Action, DocumentPermission, PermissionFlags, Role, RoleName};
use crate::models::user::{NewUser, User};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, refresh_token, created_at, updated_at";

const DOCUMENT_COLUMNS: &str =
    "id, title, description, tag, storage_path, uploaded_by, created_at, updated_at";

const DOCUMENT_PERMISSION_COLUMNS: &str =
    "id, user_id, document_id, can_read, can_update, can_delete, created_at, updated_at";

/// Shared filter clause for search and its count query.
const DOCUMENT_FILTER_CLAUSE: &str = r#"
    ($1::text IS NULL OR title LIKE $1 ESCAPE '\')
    AND ($2::text IS NULL OR tag LIKE $2 ESCAPE '\')
    AND ($3::uuid IS NULL OR uploaded_by = $3)
    AND ($4::timestamptz IS NULL OR created_at >= $4)
    AND ($5::timestamptz IS NULL OR created_at <= $5)
"#;

/// All stores backed by one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn single_role(&self, user_id: Uuid) -> RepoResult<Option<Role>> {
        let mut roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        match roles.len() {
            0 => Ok(None),
            1 => Ok(roles.pop()),
            n => Err(RepositoryError::Integrity(format!(
                "user {} has {} roles assigned",
                user_id, n
            ))),
        }
    }
}

/// Substring `LIKE` pattern with wildcards in the needle escaped.
fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn exists_by_username_or_email(&self, username: &str, email: &str) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_role_by_name(&self, name: RoleName) -> RepoResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>("SELECT id, name FROM roles WHERE name = $1")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    async fn find_role_by_user_id(&self, user_id: Uuid) -> RepoResult<Option<Role>> {
        self.single_role(user_id).await
    }

    async fn create_with_role(&self, new_user: NewUser, role_id: Uuid) -> RepoResult<User> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
            .bind(user.id)
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        // Dropping `tx` on any early return above rolls both inserts back.
        tx.commit().await?;
        Ok(user)
    }

    async fn set_refresh_token(&self, user_id: Uuid, token: Option<&str>) -> RepoResult<()> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace_refresh_token(
        &self,
        user_id: Uuid,
        expected: &str,
        replacement: &str,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = $3, updated_at = NOW()
            WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(user_id)
        .bind(expected)
        .bind(replacement)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionRepository for PgStore {
    async fn find_user_role(&self, user_id: Uuid) -> RepoResult<Option<Role>> {
        self.single_role(user_id).await
    }

    async fn find_document(&self, document_id: Uuid) -> RepoResult<Option<Document>> {
        DocumentRepository::find_by_id(self, document_id).await
    }

    async fn role_has_permission(&self, role_id: Uuid, action: Action) -> RepoResult<bool> {
        let granted: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM role_permissions rp
                JOIN global_permissions gp ON gp.id = rp.permission_id
                WHERE rp.role_id = $1 AND gp.action = $2
            )
            "#,
        )
        .bind(role_id)
        .bind(action.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(granted)
    }

    async fn list_role_actions(&self, role_id: Uuid) -> RepoResult<Vec<Action>> {
        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT gp.action
            FROM role_permissions rp
            JOIN global_permissions gp ON gp.id = rp.permission_id
            WHERE rp.role_id = $1
            ORDER BY gp.action
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|raw| {
                raw.parse::<Action>()
                    .map_err(|e| RepositoryError::Integrity(e.to_string()))
            })
            .collect()
    }

    async fn find_document_permission(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> RepoResult<Option<DocumentPermission>> {
        let row = sqlx::query_as::<_, DocumentPermission>(&format!(
            "SELECT {} FROM document_permissions WHERE user_id = $1 AND document_id = $2",
            DOCUMENT_PERMISSION_COLUMNS
        ))
        .bind(user_id)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_document_permission(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        flags: PermissionFlags,
    ) -> RepoResult<DocumentPermission> {
        let row = sqlx::query_as::<_, DocumentPermission>(&format!(
            r#"
            INSERT INTO document_permissions (user_id, document_id, can_read, can_update, can_delete)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, document_id) DO UPDATE SET
                can_read = EXCLUDED.can_read,
                can_update = EXCLUDED.can_update,
                can_delete = EXCLUDED.can_delete,
                updated_at = NOW()
            RETURNING {}
            "#,
            DOCUMENT_PERMISSION_COLUMNS
        ))
        .bind(user_id)
        .bind(document_id)
        .bind(flags.can_read)
        .bind(flags.can_update)
        .bind(flags.can_delete)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_document_permission(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> RepoResult<bool> {
        let result =
            sqlx::query("DELETE FROM document_permissions WHERE user_id = $1 AND document_id = $2")
                .bind(user_id)
                .bind(document_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DocumentRepository for PgStore {
    async fn create(&self, new_document: NewDocument) -> RepoResult<Document> {
        let document = sqlx::query_as::<_, Document>(&format!(
            r#"
            INSERT INTO documents (title, description, tag, storage_path, uploaded_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(&new_document.title)
        .bind(&new_document.description)
        .bind(&new_document.tag)
        .bind(&new_document.storage_path)
        .bind(new_document.uploaded_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(document)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(document)
    }

    async fn list(&self, limit: i64, offset: i64) -> RepoResult<(Vec<Document>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;

        let documents = sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            DOCUMENT_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((documents, total))
    }

    async fn search(
        &self,
        filter: &DocumentFilter,
        limit: i64,
        offset: i64,
    ) -> RepoResult<(Vec<Document>, i64)> {
        let title = filter.title.as_deref().map(contains_pattern);
        let tag = filter.tag.as_deref().map(contains_pattern);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM documents WHERE {}",
            DOCUMENT_FILTER_CLAUSE
        ))
        .bind(&title)
        .bind(&tag)
        .bind(filter.uploaded_by)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_one(&self.pool)
        .await?;

        let documents = sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents WHERE {} ORDER BY created_at DESC LIMIT $6 OFFSET $7",
            DOCUMENT_COLUMNS, DOCUMENT_FILTER_CLAUSE
        ))
        .bind(&title)
        .bind(&tag)
        .bind(filter.uploaded_by)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((documents, total))
    }

    async fn update(&self, id: Uuid, changes: DocumentChanges) -> RepoResult<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(&format!(
            r#"
            UPDATE documents SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                tag = COALESCE($4, tag),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.tag)
        .fetch_optional(&self.pool)
        .await?;
        Ok(document)
    }

    async fn delete(&self, id: Uuid) -> RepoResult<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(&format!(
            "DELETE FROM documents WHERE id = $1 RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("report"), "%report%");
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
    }
}

//! In-memory implementation of the repository traits.
//!
//! Mirrors the PostgreSQL semantics that the services rely on (unique
//! username/email, one role per user, transactional registration,
//! compare-and-swap refresh tokens) and adds switches for simulating
//! storage faults in tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    DocumentRepository, PermissionRepository, RepoResult, RepositoryError, UserRepository,
};
use crate::models::document::{Document, DocumentChanges, DocumentFilter, NewDocument};
use crate::models::role::{
    default_grants, Action, DocumentPermission, PermissionFlags, Role, RoleName,
};
use crate::models::user::{NewUser, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    roles: Vec<Role>,
    /// (user_id, role_id); a Vec so integrity faults can be staged
    user_roles: Vec<(Uuid, Uuid)>,
    /// Global permission catalog: id -> action
    catalog: HashMap<Uuid, Action>,
    /// (role_id, permission_id)
    grants: HashSet<(Uuid, Uuid)>,
    /// Insertion order
    documents: Vec<Document>,
    document_permissions: HashMap<(Uuid, Uuid), DocumentPermission>,
}

impl Tables {
    fn catalog() -> Self {
        let mut tables = Tables::default();
        for name in RoleName::ALL {
            tables.roles.push(Role {
                id: Uuid::new_v4(),
                name,
            });
        }
        for action in Action::ALL {
            tables.catalog.insert(Uuid::new_v4(), action);
        }
        tables
    }

    fn single_role(&self, user_id: Uuid) -> RepoResult<Option<Role>> {
        let roles: Vec<&Role> = self
            .user_roles
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .filter_map(|(_, rid)| self.roles.iter().find(|r| r.id == *rid))
            .collect();

        match roles.as_slice() {
            [] => Ok(None),
            [role] => Ok(Some((*role).clone())),
            many => Err(RepositoryError::Integrity(format!(
                "user {} has {} roles assigned",
                user_id,
                many.len()
            ))),
        }
    }

    fn permission_id(&self, action: Action) -> Option<Uuid> {
        self.catalog
            .iter()
            .find(|(_, a)| **a == action)
            .map(|(id, _)| *id)
    }

    fn newest_first<'a>(&'a self, filter: &DocumentFilter) -> Vec<&'a Document> {
        let mut docs: Vec<&Document> = self
            .documents
            .iter()
            .rev()
            .filter(|d| filter.matches(d))
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs
    }
}

fn page(docs: Vec<&Document>, limit: i64, offset: i64) -> (Vec<Document>, i64) {
    let total = docs.len() as i64;
    let page = docs
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect();
    (page, total)
}

/// Process-local store implementing every repository trait.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    fail_role_assignment: AtomicBool,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    /// Empty store with the role and action catalog but no grants.
    pub fn new() -> Self {
        Self::with_tables(Tables::catalog())
    }

    /// Store with the same catalog and grant matrix the migrations seed.
    pub fn seeded() -> Self {
        let mut tables = Tables::catalog();
        for role in tables.roles.clone() {
            for action in default_grants(role.name) {
                if let Some(pid) = tables.permission_id(*action) {
                    tables.grants.insert((role.id, pid));
                }
            }
        }
        Self::with_tables(tables)
    }

    fn with_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
            fail_role_assignment: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
        }
    }

    fn check_available(&self) -> RepoResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("store unavailable".to_string()));
        }
        Ok(())
    }
}

/// Fixture controls for tests. Not part of the repository surface.
#[cfg(any(test, feature = "test-utils"))]
impl InMemoryStore {
    /// Replace every grant held by `role` with `actions`.
    pub async fn set_role_grants(&self, role: RoleName, actions: &[Action]) {
        let mut tables = self.tables.write().await;
        let Some(role_id) = tables.roles.iter().find(|r| r.name == role).map(|r| r.id) else {
            return;
        };
        tables.grants.retain(|(rid, _)| *rid != role_id);
        for action in actions {
            if let Some(pid) = tables.permission_id(*action) {
                tables.grants.insert((role_id, pid));
            }
        }
    }

    /// Drop an action from the catalog (and every grant referencing it).
    pub async fn remove_catalog_action(&self, action: Action) {
        let mut tables = self.tables.write().await;
        if let Some(pid) = tables.permission_id(action) {
            tables.catalog.remove(&pid);
            tables.grants.retain(|(_, p)| *p != pid);
        }
    }

    /// Give a user an extra role row, breaking the one-role invariant.
    pub async fn assign_additional_role(&self, user_id: Uuid, role: RoleName) {
        let mut tables = self.tables.write().await;
        if let Some(role_id) = tables.roles.iter().find(|r| r.name == role).map(|r| r.id) {
            tables.user_roles.push((user_id, role_id));
        }
    }

    /// Remove every role assignment of a user.
    pub async fn clear_roles(&self, user_id: Uuid) {
        let mut tables = self.tables.write().await;
        tables.user_roles.retain(|(uid, _)| *uid != user_id);
    }

    /// Make the next registration fail while writing the role assignment.
    pub fn fail_next_role_assignment(&self) {
        self.fail_role_assignment.store(true, Ordering::SeqCst);
    }

    /// Simulate an unreachable store.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current stored refresh token of a user.
    pub async fn refresh_token_of(&self, user_id: Uuid) -> Option<String> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(&user_id)
            .and_then(|u| u.refresh_token.clone())
    }

    pub async fn document_count(&self) -> usize {
        self.tables.read().await.documents.len()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn role_assignment_count(&self) -> usize {
        self.tables.read().await.user_roles.len()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        self.check_available()?;
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn exists_by_username_or_email(&self, username: &str, email: &str) -> RepoResult<bool> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .any(|u| u.username == username || u.email == email))
    }

    async fn find_role_by_name(&self, name: RoleName) -> RepoResult<Option<Role>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.roles.iter().find(|r| r.name == name).cloned())
    }

    async fn find_role_by_user_id(&self, user_id: Uuid) -> RepoResult<Option<Role>> {
        self.check_available()?;
        self.tables.read().await.single_role(user_id)
    }

    async fn create_with_role(&self, new_user: NewUser, role_id: Uuid) -> RepoResult<User> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        if tables.users.values().any(|u| u.username == new_user.username) {
            return Err(RepositoryError::UniqueViolation("users_username_key".into()));
        }
        if tables.users.values().any(|u| u.email == new_user.email) {
            return Err(RepositoryError::UniqueViolation("users_email_key".into()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };

        tables.users.insert(user.id, user.clone());

        let assigned = if self.fail_role_assignment.swap(false, Ordering::SeqCst) {
            Err(RepositoryError::Backend("failed to assign role".into()))
        } else if !tables.roles.iter().any(|r| r.id == role_id) {
            Err(RepositoryError::Backend(format!(
                "role {} does not exist",
                role_id
            )))
        } else {
            tables.user_roles.push((user.id, role_id));
            Ok(())
        };

        if let Err(e) = assigned {
            // Roll back the user row so neither row survives.
            tables.users.remove(&user.id);
            tables.user_roles.retain(|(uid, _)| *uid != user.id);
            return Err(e);
        }
        Ok(user)
    }

    async fn set_refresh_token(&self, user_id: Uuid, token: Option<&str>) -> RepoResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.refresh_token = token.map(str::to_string);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn replace_refresh_token(
        &self,
        user_id: Uuid,
        expected: &str,
        replacement: &str,
    ) -> RepoResult<bool> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&user_id) {
            Some(user) if user.refresh_token.as_deref() == Some(expected) => {
                user.refresh_token = Some(replacement.to_string());
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> RepoResult<()> {
        self.check_available()
    }
}

#[async_trait]
impl PermissionRepository for InMemoryStore {
    async fn find_user_role(&self, user_id: Uuid) -> RepoResult<Option<Role>> {
        self.check_available()?;
        self.tables.read().await.single_role(user_id)
    }

    async fn find_document(&self, document_id: Uuid) -> RepoResult<Option<Document>> {
        DocumentRepository::find_by_id(self, document_id).await
    }

    async fn role_has_permission(&self, role_id: Uuid, action: Action) -> RepoResult<bool> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .permission_id(action)
            .map_or(false, |pid| tables.grants.contains(&(role_id, pid))))
    }

    async fn list_role_actions(&self, role_id: Uuid) -> RepoResult<Vec<Action>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let mut actions: Vec<Action> = tables
            .grants
            .iter()
            .filter(|(rid, _)| *rid == role_id)
            .filter_map(|(_, pid)| tables.catalog.get(pid).copied())
            .collect();
        actions.sort_by_key(|a| a.as_str());
        Ok(actions)
    }

    async fn find_document_permission(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> RepoResult<Option<DocumentPermission>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .document_permissions
            .get(&(user_id, document_id))
            .cloned())
    }

    async fn upsert_document_permission(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        flags: PermissionFlags,
    ) -> RepoResult<DocumentPermission> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let entry = tables
            .document_permissions
            .entry((user_id, document_id))
            .or_insert_with(|| DocumentPermission {
                id: Uuid::new_v4(),
                user_id,
                document_id,
                can_read: flags.can_read,
                can_update: flags.can_update,
                can_delete: flags.can_delete,
                created_at: now,
                updated_at: now,
            });
        entry.can_read = flags.can_read;
        entry.can_update = flags.can_update;
        entry.can_delete = flags.can_delete;
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn delete_document_permission(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> RepoResult<bool> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        Ok(tables
            .document_permissions
            .remove(&(user_id, document_id))
            .is_some())
    }
}

#[async_trait]
impl DocumentRepository for InMemoryStore {
    async fn create(&self, new_document: NewDocument) -> RepoResult<Document> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&new_document.uploaded_by) {
            return Err(RepositoryError::Backend(format!(
                "uploader {} does not exist",
                new_document.uploaded_by
            )));
        }
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            title: new_document.title,
            description: new_document.description,
            tag: new_document.tag,
            storage_path: new_document.storage_path,
            uploaded_by: new_document.uploaded_by,
            created_at: now,
            updated_at: now,
        };
        tables.documents.push(document.clone());
        Ok(document)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Document>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> RepoResult<(Vec<Document>, i64)> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(page(
            tables.newest_first(&DocumentFilter::default()),
            limit,
            offset,
        ))
    }

    async fn search(
        &self,
        filter: &DocumentFilter,
        limit: i64,
        offset: i64,
    ) -> RepoResult<(Vec<Document>, i64)> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(page(tables.newest_first(filter), limit, offset))
    }

    async fn update(&self, id: Uuid, changes: DocumentChanges) -> RepoResult<Option<Document>> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let Some(document) = tables.documents.iter_mut().find(|d| d.id == id) else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            document.title = title;
        }
        if let Some(description) = changes.description {
            document.description = Some(description);
        }
        if let Some(tag) = changes.tag {
            document.tag = tag;
        }
        document.updated_at = Utc::now();
        Ok(Some(document.clone()))
    }

    async fn delete(&self, id: Uuid) -> RepoResult<Option<Document>> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let Some(pos) = tables.documents.iter().position(|d| d.id == id) else {
            return Ok(None);
        };
        let document = tables.documents.remove(pos);
        tables
            .document_permissions
            .retain(|(_, doc_id), _| *doc_id != id);
        Ok(Some(document))
    }
}

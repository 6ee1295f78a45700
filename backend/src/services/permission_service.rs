//! Permission resolution.
//!
//! Decides whether a caller may perform an action, either globally (role
//! grants only) or against a specific document (ownership or ADMIN role,
//! then role grants). Resolution only reads from the stores.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::role::{Action, DocumentPermission, PermissionFlags, Role, RoleName};
use crate::repositories::{PermissionRepository, RepositoryError, UserRepository};

/// Why a decision could not be reached
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("User has no role assigned")]
    NoRoleAssigned,

    #[error("Document not found")]
    DocumentNotFound,

    #[error("Permission lookup failed: {0}")]
    RepositoryFailure(String),
}

/// `Ok(true)` allow, `Ok(false)` deny.
pub type Decision = std::result::Result<bool, PermissionError>;

impl From<RepositoryError> for PermissionError {
    fn from(err: RepositoryError) -> Self {
        PermissionError::RepositoryFailure(err.to_string())
    }
}

impl From<PermissionError> for AppError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::NoRoleAssigned => AppError::Authorization(err.to_string()),
            PermissionError::DocumentNotFound => AppError::NotFound(err.to_string()),
            PermissionError::RepositoryFailure(detail) => AppError::Repository(detail),
        }
    }
}

/// Permission resolver plus per-document override management
pub struct PermissionService {
    permissions: Arc<dyn PermissionRepository>,
    users: Arc<dyn UserRepository>,
    overrides_enabled: bool,
}

impl PermissionService {
    pub fn new(
        permissions: Arc<dyn PermissionRepository>,
        users: Arc<dyn UserRepository>,
        overrides_enabled: bool,
    ) -> Self {
        Self {
            permissions,
            users,
            overrides_enabled,
        }
    }

    pub fn overrides_enabled(&self) -> bool {
        self.overrides_enabled
    }

    /// Whether the caller's role holds a grant for `action`.
    pub async fn can_perform_global_action(&self, user_id: Uuid, action: Action) -> Decision {
        let role = self.resolve_role(user_id).await?;
        let allowed = self.role_grants(&role, action).await?;

        if allowed {
            tracing::debug!(user_id = %user_id, role = %role.name, action = %action, "Global action allowed");
        } else {
            tracing::warn!(user_id = %user_id, role = %role.name, action = %action, "Global action denied");
        }
        Ok(allowed)
    }

    /// Whether the caller may perform `action` on one document.
    ///
    /// Owners and ADMIN callers are eligible and then need the role grant.
    /// Everyone else is denied, unless per-document overrides are enabled and
    /// the caller's override flag for `action` is set, in which case the role
    /// grant decides. `role` is the caller's asserted role; ADMIN eligibility
    /// also requires the role resolved from the store to be ADMIN.
    pub async fn can_change_document(
        &self,
        user_id: Uuid,
        role: RoleName,
        document_id: Uuid,
        action: Action,
    ) -> Decision {
        let resolved = self.resolve_role(user_id).await?;

        let document = self
            .permissions
            .find_document(document_id)
            .await?
            .ok_or(PermissionError::DocumentNotFound)?;

        let is_admin = role.is_admin() && resolved.name.is_admin();
        let eligible = if document.is_owned_by(user_id) || is_admin {
            true
        } else {
            self.override_allows(user_id, document_id, action).await?
        };

        if !eligible {
            tracing::warn!(
                user_id = %user_id,
                document_id = %document_id,
                action = %action,
                "Document action denied: caller is neither owner nor admin"
            );
            return Ok(false);
        }

        let allowed = self.role_grants(&resolved, action).await?;
        if allowed {
            tracing::debug!(user_id = %user_id, document_id = %document_id, action = %action, "Document action allowed");
        } else {
            tracing::warn!(
                user_id = %user_id,
                document_id = %document_id,
                role = %resolved.name,
                action = %action,
                "Document action denied: role lacks grant"
            );
        }
        Ok(allowed)
    }

    /// The caller's role and every action it is granted.
    pub async fn role_actions(
        &self,
        user_id: Uuid,
    ) -> std::result::Result<(Role, Vec<Action>), PermissionError> {
        let role = self.resolve_role(user_id).await?;
        let actions = self.permissions.list_role_actions(role.id).await?;
        Ok((role, actions))
    }

    /// Create or replace the override of `user_id` on `document_id`.
    pub async fn grant_document_permission(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        flags: PermissionFlags,
    ) -> Result<DocumentPermission> {
        self.permissions
            .find_document(document_id)
            .await?
            .ok_or(PermissionError::DocumentNotFound)?;
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        let permission = self
            .permissions
            .upsert_document_permission(user_id, document_id, flags)
            .await?;

        tracing::info!(
            document_id = %document_id,
            user_id = %user_id,
            can_read = flags.can_read,
            can_update = flags.can_update,
            can_delete = flags.can_delete,
            "Document permission granted"
        );
        Ok(permission)
    }

    pub async fn revoke_document_permission(&self, document_id: Uuid, user_id: Uuid) -> Result<()> {
        let removed = self
            .permissions
            .delete_document_permission(user_id, document_id)
            .await?;
        if !removed {
            return Err(AppError::NotFound(format!(
                "No permission for user {} on document {}",
                user_id, document_id
            )));
        }

        tracing::info!(document_id = %document_id, user_id = %user_id, "Document permission revoked");
        Ok(())
    }

    async fn resolve_role(&self, user_id: Uuid) -> std::result::Result<Role, PermissionError> {
        match self.permissions.find_user_role(user_id).await {
            Ok(Some(role)) => Ok(role),
            Ok(None) => {
                tracing::warn!(user_id = %user_id, "No role assigned");
                Err(PermissionError::NoRoleAssigned)
            }
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "Role lookup failed");
                Err(err.into())
            }
        }
    }

    async fn role_grants(&self, role: &Role, action: Action) -> Decision {
        self.permissions
            .role_has_permission(role.id, action)
            .await
            .map_err(|err| {
                tracing::error!(role = %role.name, action = %action, error = %err, "Grant lookup failed");
                err.into()
            })
    }

    async fn override_allows(&self, user_id: Uuid, document_id: Uuid, action: Action) -> Decision {
        if !self.overrides_enabled {
            return Ok(false);
        }
        let flags = self
            .permissions
            .find_document_permission(user_id, document_id)
            .await?
            .map(|p| p.flags());
        Ok(flags.map_or(false, |f| f.allows(action)))
    }
}

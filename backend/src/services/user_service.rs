//! Registration, login and profile lookups.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::role::{Action, RoleName};
use crate::models::user::{NewUser, User};
use crate::repositories::UserRepository;
use crate::services::auth_service::{hash_password, verify_password, AuthError, AuthService, TokenPair};
use crate::services::permission_service::PermissionService;

/// A successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub role: RoleName,
    pub tokens: TokenPair,
}

/// The authenticated user with the actions their role grants
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub role: RoleName,
    pub actions: Vec<Action>,
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    auth: Arc<AuthService>,
    permissions: Arc<PermissionService>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        auth: Arc<AuthService>,
        permissions: Arc<PermissionService>,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users,
            auth,
            permissions,
            bcrypt_cost,
        }
    }

    /// Create a user and its role assignment atomically.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: RoleName,
    ) -> std::result::Result<User, AuthError> {
        if self
            .users
            .exists_by_username_or_email(username, email)
            .await?
        {
            return Err(AuthError::DuplicateIdentity);
        }

        let role_row = self
            .users
            .find_role_by_name(role)
            .await?
            .ok_or_else(|| AuthError::UnknownRole(role.to_string()))?;

        let password_hash = hash_password(password, self.bcrypt_cost)?;

        let user = self
            .users
            .create_with_role(
                NewUser {
                    username: username.to_string(),
                    email: email.to_string(),
                    password_hash,
                },
                role_row.id,
            )
            .await?;

        tracing::info!(user_id = %user.id, username = %user.username, role = %role, "User registered");
        Ok(user)
    }

    /// Check credentials and open a session.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<LoginOutcome, AuthError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !verify_password(password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AuthError::BadCredentials);
        }

        let role = self
            .users
            .find_role_by_user_id(user.id)
            .await?
            .ok_or(AuthError::NoRoleAssigned)?
            .name;

        let tokens = self.auth.issue_session(&user, role).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome { user, role, tokens })
    }

    pub async fn logout(&self, user_id: Uuid) -> std::result::Result<(), AuthError> {
        self.auth.end_session(user_id).await
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<CurrentUser> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let (role, actions) = self.permissions.role_actions(user_id).await?;

        Ok(CurrentUser {
            user,
            role: role.name,
            actions,
        })
    }
}

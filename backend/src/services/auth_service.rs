//! Authentication service.
//!
//! Issues, rotates and ends sessions (access + refresh token pairs) and
//! owns password hashing.

use std::sync::Arc;

use bcrypt::{hash, verify};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::role::RoleName;
use crate::models::user::User;
use crate::repositories::{RepositoryError, UserRepository};
use crate::services::token_service::{AccessClaims, TokenError, TokenService};

/// Session and identity failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Refresh token has already been used or revoked")]
    TokenRotated,

    #[error("User has no role assigned")]
    NoRoleAssigned,

    #[error("Invalid credentials")]
    BadCredentials,

    #[error("A user with this username or email already exists")]
    DuplicateIdentity,

    #[error("Role {0} does not exist")]
    UnknownRole(String),

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::UniqueViolation(_) => AuthError::DuplicateIdentity,
            other => AuthError::Repository(other),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(msg) => AuthError::Signing(msg),
            TokenError::Expired | TokenError::Invalid(_) => AuthError::InvalidToken,
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken | AuthError::BadCredentials => {
                AppError::Authentication(err.to_string())
            }
            AuthError::TokenRotated | AuthError::DuplicateIdentity => {
                AppError::Conflict(err.to_string())
            }
            AuthError::UserNotFound | AuthError::UnknownRole(_) => {
                AppError::NotFound(err.to_string())
            }
            AuthError::NoRoleAssigned => AppError::Authorization(err.to_string()),
            AuthError::Signing(_) | AuthError::Hashing(_) => AppError::Internal(err.to_string()),
            AuthError::Repository(repo) => repo.into(),
        }
    }
}

/// Token pair response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Result of a successful rotation
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub role: RoleName,
    pub tokens: TokenPair,
}

/// Hash a password with bcrypt at the given cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    hash(password, cost).map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AuthError> {
    verify(password, password_hash).map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Authentication service
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, tokens: Arc<TokenService>) -> Self {
        Self { users, tokens }
    }

    /// Sign a fresh pair for `user` and make its refresh token the only valid one.
    pub async fn issue_session(&self, user: &User, role: RoleName) -> Result<TokenPair, AuthError> {
        let tokens = self.sign_pair(user, role)?;
        self.users
            .set_refresh_token(user.id, Some(&tokens.refresh_token))
            .await?;

        tracing::debug!(user_id = %user.id, role = %role, "Session issued");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new pair. Each refresh token is accepted once.
    pub async fn rotate_session(&self, old_refresh: &str) -> Result<Session, AuthError> {
        let claims = self.tokens.verify_refresh(old_refresh)?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.refresh_token.as_deref() != Some(old_refresh) {
            tracing::warn!(user_id = %user.id, "Rejected stale refresh token");
            return Err(AuthError::TokenRotated);
        }

        let role = self
            .users
            .find_role_by_user_id(user.id)
            .await?
            .ok_or(AuthError::NoRoleAssigned)?
            .name;

        let tokens = self.sign_pair(&user, role)?;

        let swapped = self
            .users
            .replace_refresh_token(user.id, old_refresh, &tokens.refresh_token)
            .await?;
        if !swapped {
            tracing::warn!(user_id = %user.id, "Lost refresh token rotation race");
            return Err(AuthError::TokenRotated);
        }

        tracing::debug!(user_id = %user.id, "Session rotated");
        Ok(Session { user, role, tokens })
    }

    /// Invalidate the stored refresh token. Safe to call repeatedly.
    pub async fn end_session(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.users.set_refresh_token(user_id, None).await?;
        tracing::debug!(user_id = %user_id, "Session ended");
        Ok(())
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        Ok(self.tokens.verify_access(token)?)
    }

    fn sign_pair(&self, user: &User, role: RoleName) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self
                .tokens
                .sign_access(user.id, &user.username, &user.email, role)?,
            refresh_token: self.tokens.sign_refresh(user.id)?,
            expires_in: self.tokens.access_ttl_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Barrier;

    use super::*;
    use crate::models::role::Role;
    use crate::models::user::NewUser;
    use crate::repositories::memory::InMemoryStore;
    use crate::repositories::RepoResult;
    use crate::services::token_service::SigningKey;

    /// Holds the first two `find_by_id` calls until both have arrived, so two
    /// rotations read the same stored token before either swaps it.
    struct OverlappingLookups {
        inner: Arc<InMemoryStore>,
        barrier: Barrier,
        lookups: AtomicUsize,
        swaps: AtomicUsize,
    }

    impl OverlappingLookups {
        fn new(inner: Arc<InMemoryStore>) -> Self {
            Self {
                inner,
                barrier: Barrier::new(2),
                lookups: AtomicUsize::new(0),
                swaps: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UserRepository for OverlappingLookups {
        async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
            let user = self.inner.find_by_id(id).await?;
            if self.lookups.fetch_add(1, Ordering::SeqCst) < 2 {
                self.barrier.wait().await;
            }
            Ok(user)
        }

        async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            self.inner.find_by_email(email).await
        }

        async fn exists_by_username_or_email(
            &self,
            username: &str,
            email: &str,
        ) -> RepoResult<bool> {
            self.inner.exists_by_username_or_email(username, email).await
        }

        async fn find_role_by_name(&self, name: RoleName) -> RepoResult<Option<Role>> {
            self.inner.find_role_by_name(name).await
        }

        async fn find_role_by_user_id(&self, user_id: Uuid) -> RepoResult<Option<Role>> {
            self.inner.find_role_by_user_id(user_id).await
        }

        async fn create_with_role(&self, new_user: NewUser, role_id: Uuid) -> RepoResult<User> {
            self.inner.create_with_role(new_user, role_id).await
        }

        async fn set_refresh_token(&self, user_id: Uuid, token: Option<&str>) -> RepoResult<()> {
            self.inner.set_refresh_token(user_id, token).await
        }

        async fn replace_refresh_token(
            &self,
            user_id: Uuid,
            expected: &str,
            replacement: &str,
        ) -> RepoResult<bool> {
            self.swaps.fetch_add(1, Ordering::SeqCst);
            self.inner
                .replace_refresh_token(user_id, expected, replacement)
                .await
        }

        async fn ping(&self) -> RepoResult<()> {
            self.inner.ping().await
        }
    }

    fn tokens(refresh_ttl: i64) -> Arc<TokenService> {
        Arc::new(TokenService::new(
            SigningKey::new("access", 3600),
            SigningKey::new("refresh", refresh_ttl),
            SigningKey::new("download", 300),
        ))
    }

    async fn setup(refresh_ttl: i64) -> (Arc<InMemoryStore>, AuthService, User) {
        let store = Arc::new(InMemoryStore::seeded());
        let role = store
            .find_role_by_name(RoleName::User)
            .await
            .unwrap()
            .unwrap();
        let user = store
            .create_with_role(
                NewUser {
                    username: "session_user".into(),
                    email: "session@example.com".into(),
                    password_hash: "x".into(),
                },
                role.id,
            )
            .await
            .unwrap();
        let service = AuthService::new(store.clone(), tokens(refresh_ttl));
        (store, service, user)
    }

    #[test]
    fn test_password_hashing() {
        let password = "test_password_123";
        let hashed = hash_password(password, 4).unwrap();
        assert!(verify_password(password, &hashed).unwrap());
        assert!(!verify_password("wrong_password", &hashed).unwrap());
    }

    #[tokio::test]
    async fn test_issue_session_persists_refresh_token() {
        let (store, auth, user) = setup(3600).await;
        let pair = auth.issue_session(&user, RoleName::User).await.unwrap();

        assert_eq!(
            store.refresh_token_of(user.id).await,
            Some(pair.refresh_token.clone())
        );
        let claims = auth.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, RoleName::User);
    }

    #[tokio::test]
    async fn test_rotation_is_single_use() {
        let (store, auth, user) = setup(3600).await;
        let first = auth.issue_session(&user, RoleName::User).await.unwrap();

        let rotated = auth.rotate_session(&first.refresh_token).await.unwrap();
        assert_eq!(rotated.user.id, user.id);
        assert_eq!(rotated.role, RoleName::User);
        assert_ne!(rotated.tokens.refresh_token, first.refresh_token);
        assert_eq!(
            store.refresh_token_of(user.id).await,
            Some(rotated.tokens.refresh_token.clone())
        );

        let err = auth.rotate_session(&first.refresh_token).await.unwrap_err();
        assert_eq!(err, AuthError::TokenRotated);
    }

    #[tokio::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let (_store, auth, user) = setup(3600).await;
        let auth = Arc::new(auth);
        let pair = auth.issue_session(&user, RoleName::User).await.unwrap();

        let a = tokio::spawn({
            let auth = auth.clone();
            let token = pair.refresh_token.clone();
            async move { auth.rotate_session(&token).await }
        });
        let b = tokio::spawn({
            let auth = auth.clone();
            let token = pair.refresh_token.clone();
            async move { auth.rotate_session(&token).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AuthError::TokenRotated))));
        assert_eq!(
            auth.rotate_session(&pair.refresh_token).await.unwrap_err(),
            AuthError::TokenRotated
        );
    }

    #[tokio::test]
    async fn test_overlapping_rotations_lose_at_swap() {
        let (store, _auth, user) = setup(3600).await;
        let users = Arc::new(OverlappingLookups::new(store.clone()));
        let auth = AuthService::new(users.clone(), tokens(3600));
        let pair = auth.issue_session(&user, RoleName::User).await.unwrap();

        // Both calls pass the stored-token comparison before either swaps.
        let (a, b) = tokio::join!(
            auth.rotate_session(&pair.refresh_token),
            auth.rotate_session(&pair.refresh_token)
        );
        let results = [a, b];

        assert_eq!(users.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(users.swaps.load(Ordering::SeqCst), 2);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AuthError::TokenRotated))));

        let winner = results
            .iter()
            .find_map(|r| r.as_ref().ok())
            .unwrap();
        assert_eq!(
            store.refresh_token_of(user.id).await,
            Some(winner.tokens.refresh_token.clone())
        );
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_invalid() {
        let (_store, auth, user) = setup(-120).await;
        let pair = auth.issue_session(&user, RoleName::User).await.unwrap();
        assert_eq!(
            auth.rotate_session(&pair.refresh_token).await.unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[tokio::test]
    async fn test_rotation_without_role_fails() {
        let (store, auth, user) = setup(3600).await;
        let pair = auth.issue_session(&user, RoleName::User).await.unwrap();
        store.clear_roles(user.id).await;

        assert_eq!(
            auth.rotate_session(&pair.refresh_token).await.unwrap_err(),
            AuthError::NoRoleAssigned
        );
    }

    #[tokio::test]
    async fn test_end_session_is_idempotent() {
        let (store, auth, user) = setup(3600).await;
        let pair = auth.issue_session(&user, RoleName::User).await.unwrap();

        auth.end_session(user.id).await.unwrap();
        auth.end_session(user.id).await.unwrap();
        assert_eq!(store.refresh_token_of(user.id).await, None);
        assert_eq!(
            auth.rotate_session(&pair.refresh_token).await.unwrap_err(),
            AuthError::TokenRotated
        );
    }

    #[test]
    fn test_error_status_mapping() {
        use axum::http::StatusCode;
        let cases = [
            (AuthError::InvalidToken, StatusCode::UNAUTHORIZED),
            (AuthError::BadCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::TokenRotated, StatusCode::CONFLICT),
            (AuthError::DuplicateIdentity, StatusCode::CONFLICT),
            (AuthError::UserNotFound, StatusCode::NOT_FOUND),
            (AuthError::NoRoleAssigned, StatusCode::FORBIDDEN),
            (
                AuthError::Repository(RepositoryError::Backend("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }
}

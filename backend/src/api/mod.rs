//! API module - HTTP handlers and middleware.

pub mod download_response;
pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;

use std::sync::Arc;

use crate::config::Config;
use crate::repositories::Repositories;
use crate::services::auth_service::AuthService;
use crate::services::document_service::DocumentService;
use crate::services::permission_service::PermissionService;
use crate::services::token_service::TokenService;
use crate::services::user_service::UserService;
use crate::storage::StorageBackend;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repositories: Repositories,
    pub storage: Arc<dyn StorageBackend>,
    pub auth_service: Arc<AuthService>,
    pub permission_service: Arc<PermissionService>,
    pub user_service: Arc<UserService>,
    pub document_service: Arc<DocumentService>,
}

impl AppState {
    /// Wire every service against the given stores.
    pub fn new(config: Config, repositories: Repositories, storage: Arc<dyn StorageBackend>) -> Self {
        let tokens = Arc::new(TokenService::from_config(&config));
        let auth_service = Arc::new(AuthService::new(
            repositories.users.clone(),
            tokens.clone(),
        ));
        let permission_service = Arc::new(PermissionService::new(
            repositories.permissions.clone(),
            repositories.users.clone(),
            config.document_overrides_enabled,
        ));
        let user_service = Arc::new(UserService::new(
            repositories.users.clone(),
            auth_service.clone(),
            permission_service.clone(),
            config.bcrypt_cost,
        ));
        let document_service = Arc::new(DocumentService::new(
            repositories.documents.clone(),
            storage.clone(),
            tokens,
            config.server_base_url.clone(),
            config.download_token_expiry_secs,
        ));

        Self {
            config,
            repositories,
            storage,
            auth_service,
            permission_service,
            user_service,
            document_service,
        }
    }
}

pub type SharedState = Arc<AppState>;

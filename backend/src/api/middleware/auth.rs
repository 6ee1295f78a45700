//! Authentication middleware.
//!
//! Resolves the caller from an access token and attaches an [`AuthExtension`]
//! to the request.
//!
//! Supported token sources, in order:
//! - `Authorization: Bearer <jwt_token>`
//! - `accessToken` cookie

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, header::COOKIE, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::AppError;
use crate::models::role::RoleName;
use crate::services::token_service::AccessClaims;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Extension that holds authenticated user information
#[derive(Debug, Clone)]
pub struct AuthExtension {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: RoleName,
}

impl AuthExtension {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<AccessClaims> for AuthExtension {
    fn from(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Token extraction result
#[derive(Debug, PartialEq, Eq)]
enum ExtractedToken<'a> {
    Bearer(&'a str),
    None,
    /// Authorization header present but not a bearer token
    Invalid,
}

/// Value of a cookie from the `Cookie` header(s).
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

fn extract_token(headers: &HeaderMap) -> ExtractedToken<'_> {
    if let Some(auth_header) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        return match auth_header.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => ExtractedToken::Bearer(token.trim()),
            _ => ExtractedToken::Invalid,
        };
    }

    match cookie_value(headers, ACCESS_TOKEN_COOKIE) {
        Some(token) => ExtractedToken::Bearer(token),
        None => ExtractedToken::None,
    }
}

/// Authentication middleware - requires a valid access token whose user still exists
pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = match extract_token(request.headers()) {
        ExtractedToken::Bearer(token) => match state.auth_service.verify_access_token(token) {
            Ok(claims) => claims,
            Err(err) => return AppError::from(err).into_response(),
        },
        ExtractedToken::None => {
            return AppError::Authentication("Missing access token".to_string()).into_response()
        }
        ExtractedToken::Invalid => {
            return AppError::Authentication("Invalid authorization header format".to_string())
                .into_response()
        }
    };

    match state.repositories.users.find_by_id(claims.sub).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return AppError::Authentication("User no longer exists".to_string()).into_response()
        }
        Err(err) => return AppError::from(err).into_response(),
    }

    request.extensions_mut().insert(AuthExtension::from(claims));
    next.run(request).await
}

/// Admin-only middleware. Layer it inside [`auth_middleware`].
pub async fn admin_middleware(request: Request, next: Next) -> Response {
    match request.extensions().get::<AuthExtension>() {
        Some(auth) if auth.is_admin() => next.run(request).await,
        Some(_) => AppError::Authorization("Admin access required".to_string()).into_response(),
        None => AppError::Authentication("Authentication required".to_string()).into_response(),
    }
}

//! Authentication handlers: registration, login, token refresh, logout and
//! the current-user profile.

use std::sync::OnceLock;

use axum::{
    extract::{Extension, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderName, StatusCode},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::middleware::auth::{
    cookie_value, AuthExtension, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
};
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::role::{Action, RoleName};
use crate::models::user::User;
use crate::services::auth_service::TokenPair;

/// Routes that need no access token
pub fn public_router() -> Router<SharedState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
}

/// Routes that require an authenticated caller
pub fn protected_router() -> Router<SharedState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
}

const MIN_USERNAME_LEN: usize = 8;
const MIN_PASSWORD_LEN: usize = 8;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// `ADMIN` or `USER` (default)
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: UserResponse,
    pub role: RoleName,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub token_type: String,
}

impl SessionResponse {
    fn new(user: User, role: RoleName, tokens: TokenPair) -> Self {
        Self {
            user: user.into(),
            role,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
            token_type: "Bearer".to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentUserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: RoleName,
    /// Actions granted to the user's role
    pub permissions: Vec<Action>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

fn validate_registration(payload: &RegisterRequest) -> Result<RoleName> {
    if payload.username.trim().chars().count() < MIN_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "Username must be at least {} characters",
            MIN_USERNAME_LEN
        )));
    }
    if !email_regex().is_match(payload.email.trim()) {
        return Err(AppError::Validation("Email is not valid".to_string()));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    match payload.role.as_deref() {
        None => Ok(RoleName::User),
        Some(role) => role
            .parse()
            .map_err(|_| AppError::Validation("Role must be ADMIN or USER".to_string())),
    }
}

fn session_cookie(name: &str, value: &str, max_age: i64, secure: bool) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}{}",
        name,
        value,
        max_age.max(0),
        if secure { "; Secure" } else { "" }
    )
}

fn session_cookies(state: &SharedState, tokens: &TokenPair) -> AppendHeaders<[(HeaderName, String); 2]> {
    let secure = state.config.server_base_url.starts_with("https://");
    AppendHeaders([
        (
            SET_COOKIE,
            session_cookie(
                ACCESS_TOKEN_COOKIE,
                &tokens.access_token,
                state.config.access_token_expiry_secs,
                secure,
            ),
        ),
        (
            SET_COOKIE,
            session_cookie(
                REFRESH_TOKEN_COOKIE,
                &tokens.refresh_token,
                state.config.refresh_token_expiry_secs,
                secure,
            ),
        ),
    ])
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/register",
    context_path = "/api/v1/users",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Username or email already taken"),
    )
)]
pub async fn register(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let role = validate_registration(&payload)?;

    let user = state
        .user_service
        .register(
            payload.username.trim(),
            payload.email.trim(),
            &payload.password,
            role,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/login",
    context_path = "/api/v1/users",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; tokens also set as cookies", body = SessionResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 404, description = "No user with this email"),
    )
)]
pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let outcome = state
        .user_service
        .login(payload.email.trim(), &payload.password)
        .await?;

    let cookies = session_cookies(&state, &outcome.tokens);
    Ok((
        cookies,
        Json(SessionResponse::new(outcome.user, outcome.role, outcome.tokens)),
    ))
}

/// Exchange a refresh token (body or `refreshToken` cookie) for a new pair
#[utoipa::path(
    post,
    path = "/refresh-token",
    context_path = "/api/v1/users",
    tag = "auth",
    request_body(content = RefreshTokenRequest, description = "Optional when the cookie is sent"),
    responses(
        (status = 200, description = "New token pair", body = SessionResponse),
        (status = 401, description = "Invalid or expired refresh token"),
        (status = 409, description = "Refresh token already used"),
    )
)]
pub async fn refresh_token(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Option<Json<RefreshTokenRequest>>,
) -> Result<impl IntoResponse> {
    let token = payload
        .and_then(|Json(body)| body.refresh_token)
        .filter(|t| !t.is_empty())
        .or_else(|| cookie_value(&headers, REFRESH_TOKEN_COOKIE).map(str::to_string))
        .ok_or_else(|| AppError::Authentication("Missing refresh token".to_string()))?;

    let session = state.auth_service.rotate_session(&token).await?;

    let cookies = session_cookies(&state, &session.tokens);
    Ok((
        cookies,
        Json(SessionResponse::new(session.user, session.role, session.tokens)),
    ))
}

/// End the current session
#[utoipa::path(
    post,
    path = "/logout",
    context_path = "/api/v1/users",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<impl IntoResponse> {
    state.user_service.logout(auth.user_id).await?;

    let cleared = AppendHeaders([
        (SET_COOKIE, session_cookie(ACCESS_TOKEN_COOKIE, "", 0, false)),
        (SET_COOKIE, session_cookie(REFRESH_TOKEN_COOKIE, "", 0, false)),
    ]);
    Ok((
        cleared,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    ))
}

/// Get current user info
#[utoipa::path(
    get,
    path = "/me",
    context_path = "/api/v1/users",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = CurrentUserResponse),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<CurrentUserResponse>> {
    let current = state.user_service.current_user(auth.user_id).await?;

    Ok(Json(CurrentUserResponse {
        id: current.user.id,
        username: current.user.username,
        email: current.user.email,
        role: current.role,
        permissions: current.actions,
        created_at: current.user.created_at,
    }))
}

#[derive(OpenApi)]
#[openapi(
    paths(register, login, refresh_token, logout, get_current_user),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        RefreshTokenRequest,
        UserResponse,
        SessionResponse,
        CurrentUserResponse,
        MessageResponse,
        RoleName,
        Action,
    ))
)]
pub struct AuthApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str, role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn test_valid_registration_defaults_to_user() {
        let role = validate_registration(&request("alice_user", "a@example.com", "password1", None))
            .unwrap();
        assert_eq!(role, RoleName::User);
    }

    #[test]
    fn test_registration_rules() {
        let cases = [
            request("short", "a@example.com", "password1", None),
            request("alice_user", "not-an-email", "password1", None),
            request("alice_user", "a@example.com", "short", None),
            request("alice_user", "a@example.com", "password1", Some("ROOT")),
        ];
        for case in cases {
            assert!(matches!(
                validate_registration(&case),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_admin_role_accepted() {
        let role = validate_registration(&request(
            "admin_user",
            "admin@example.com",
            "password1",
            Some("ADMIN"),
        ))
        .unwrap();
        assert_eq!(role, RoleName::Admin);
    }

    #[test]
    fn test_session_cookie_format() {
        let cookie = session_cookie(ACCESS_TOKEN_COOKIE, "abc", 60, true);
        assert_eq!(
            cookie,
            "accessToken=abc; Path=/; HttpOnly; SameSite=Strict; Max-Age=60; Secure"
        );
        assert!(session_cookie(REFRESH_TOKEN_COOKIE, "", 0, false).ends_with("Max-Age=0"));
    }
}

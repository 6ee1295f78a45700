//! Authorization guards.
//!
//! Run the permission resolver for the authenticated caller before the
//! handler. Both guards must be layered inside the auth middleware; the
//! document guard must be a route layer so the `:id` path parameter is
//! available.

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use super::auth::AuthExtension;
use crate::api::SharedState;
use crate::error::AppError;
use crate::models::role::Action;
use crate::services::permission_service::Decision;

/// Guard state: the action a route requires
#[derive(Clone)]
pub struct ActionGuard {
    pub state: SharedState,
    pub action: Action,
}

impl ActionGuard {
    pub fn new(state: &SharedState, action: Action) -> Self {
        Self {
            state: state.clone(),
            action,
        }
    }
}

fn caller(request: &Request) -> Result<AuthExtension, AppError> {
    request
        .extensions()
        .get::<AuthExtension>()
        .cloned()
        .ok_or_else(|| AppError::Authentication("Authentication required".to_string()))
}

async fn enforce(decision: Decision, action: Action, request: Request, next: Next) -> Response {
    match decision {
        Ok(true) => next.run(request).await,
        Ok(false) => AppError::Authorization(format!(
            "You do not have permission to perform {}",
            action
        ))
        .into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

/// Requires the caller's role to hold `guard.action`.
pub async fn require_global_action(
    State(guard): State<ActionGuard>,
    request: Request,
    next: Next,
) -> Response {
    let auth = match caller(&request) {
        Ok(auth) => auth,
        Err(err) => return err.into_response(),
    };

    let decision = guard
        .state
        .permission_service
        .can_perform_global_action(auth.user_id, guard.action)
        .await;
    enforce(decision, guard.action, request, next).await
}

/// Requires the caller to be allowed `guard.action` on the document in the path.
pub async fn require_document_action(
    State(guard): State<ActionGuard>,
    Path(document_id): Path<Uuid>,
    request: Request,
    next: Next,
) -> Response {
    let auth = match caller(&request) {
        Ok(auth) => auth,
        Err(err) => return err.into_response(),
    };

    let decision = guard
        .state
        .permission_service
        .can_change_document(auth.user_id, auth.role, document_id, guard.action)
        .await;
    enforce(decision, guard.action, request, next).await
}

//! Route definitions for the API.

use axum::{middleware, routing::get, Json, Router};

use super::handlers;
use super::middleware::auth::auth_middleware;
use super::SharedState;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    // Build OpenAPI spec once at startup
    let openapi = super::openapi::build_openapi();

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/livez", get(handlers::health::liveness_check))
        .route(
            "/api/v1/openapi.json",
            get(move || async move { Json(openapi) }),
        )
        .nest("/api/v1", api_v1_routes(state.clone()))
        .with_state(state)
}

fn api_v1_routes(state: SharedState) -> Router<SharedState> {
    let authenticated = || middleware::from_fn_with_state(state.clone(), auth_middleware);

    Router::new()
        .nest(
            "/users",
            handlers::auth::public_router()
                .merge(handlers::auth::protected_router().layer(authenticated())),
        )
        .nest(
            "/documents",
            handlers::documents::public_router()
                .merge(handlers::documents::protected_router(&state).layer(authenticated())),
        )
}

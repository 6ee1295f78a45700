//! OpenAPI specification generated from handler annotations via utoipa.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Top-level OpenAPI document.
///
/// Each handler module contributes its own paths and schemas via a
/// per-module `#[derive(OpenApi)]` struct merged in [`build_openapi`].
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Doc Vault API",
        description = "Document storage with role-based and per-document permissions.",
        version = "0.1.0"
    ),
    servers(
        (url = "/", description = "Current server"),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and session tokens"),
        (name = "documents", description = "Document upload, search and download"),
        (name = "health", description = "Health and liveness checks"),
    ),
    components(schemas(ErrorResponse))
)]
pub struct ApiDoc;

/// Standard error response body returned by all endpoints on failure.
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_ERROR")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// Adds Bearer JWT security scheme to the OpenAPI spec.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Build the merged OpenAPI document from all handler modules.
pub fn build_openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    doc.merge(super::handlers::auth::AuthApiDoc::openapi());
    doc.merge(super::handlers::documents::DocumentsApiDoc::openapi());
    doc.merge(super::handlers::health::HealthApiDoc::openapi());

    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_is_valid() {
        let spec = build_openapi();
        assert_eq!(spec.info.title, "Doc Vault API");

        for path in [
            "/api/v1/users/register",
            "/api/v1/users/login",
            "/api/v1/users/refresh-token",
            "/api/v1/users/me",
            "/api/v1/documents",
            "/api/v1/documents/search",
            "/api/v1/documents/{id}/metadata",
            "/api/v1/documents/{id}/permissions",
            "/api/v1/documents/download/{token}",
            "/health",
        ] {
            assert!(
                spec.paths.paths.contains_key(path),
                "Missing path: {path}"
            );
        }

        let has_bearer = spec
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("bearer_auth"));
        assert!(has_bearer, "Bearer auth security scheme is missing.");
    }

    #[test]
    fn test_openapi_tags() {
        let spec = build_openapi();
        let tags: Vec<&str> = spec
            .tags
            .as_ref()
            .map_or(vec![], |t| t.iter().map(|tag| tag.name.as_str()).collect());
        assert_eq!(tags, vec!["auth", "documents", "health"]);
    }
}

//! Document handlers: upload, listing, search, metadata updates, deletion,
//! per-document permission overrides and download links.

use axum::{
    extract::{DefaultBodyLimit, Extension, Multipart, Path, Query, State},
    handler::Handler,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::download_response::DownloadResponse;
use crate::api::dto::{Pagination, PaginationQuery};
use crate::api::middleware::auth::{admin_middleware, AuthExtension};
use crate::api::middleware::authorize::{
    require_document_action, require_global_action, ActionGuard,
};
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::document::{Document, DocumentChanges, DocumentFilter};
use crate::models::role::{Action, DocumentPermission, PermissionFlags};
use crate::services::document_service::{DocumentPage, DownloadLink, UploadDocument};

const MIN_TITLE_LEN: usize = 8;
const MIN_TAG_LEN: usize = 5;

/// Routes reachable without an access token
pub fn public_router() -> Router<SharedState> {
    Router::new().route("/download/:token", get(download_document))
}

/// Authenticated routes, each behind the permission check it needs
pub fn protected_router(state: &SharedState) -> Router<SharedState> {
    let global = |action| {
        middleware::from_fn_with_state(ActionGuard::new(state, action), require_global_action)
    };
    let on_document = |action| {
        middleware::from_fn_with_state(ActionGuard::new(state, action), require_document_action)
    };

    let permission_routes = Router::new()
        .route("/:id/permissions", post(grant_permission))
        .route("/:id/permissions/:user_id", delete(revoke_permission))
        .route_layer(global(Action::ManagePermissions))
        .route_layer(middleware::from_fn(admin_middleware));

    Router::new()
        .route(
            "/search",
            get(search_documents.layer(global(Action::ReadDocument))),
        )
        .route(
            "/",
            get(list_documents.layer(global(Action::ReadDocument))).post(
                upload_document
                    .layer(global(Action::CreateDocument))
                    .layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
            ),
        )
        .route(
            "/:id",
            get(get_document.layer(global(Action::ReadDocument)))
                .delete(delete_document.layer(on_document(Action::DeleteDocument))),
        )
        .route(
            "/:id/metadata",
            patch(update_metadata.layer(on_document(Action::UpdateDocument))),
        )
        .route(
            "/:id/download",
            get(create_download_link.layer(global(Action::ReadDocument))),
        )
        .merge(permission_routes)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentListResponse {
    pub items: Vec<Document>,
    pub pagination: Pagination,
}

impl DocumentListResponse {
    fn new(page: DocumentPage, query: &PaginationQuery) -> Self {
        Self {
            pagination: Pagination::from_query_and_total(query, page.total),
            items: page.items,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchDocumentsQuery {
    /// Substring of the title
    pub title: Option<String>,
    /// Substring of the tag
    pub tag: Option<String>,
    /// Owner id
    pub uploaded_by: Option<String>,
    /// RFC 3339 lower bound on creation time
    pub start_date: Option<String>,
    /// RFC 3339 upper bound on creation time
    pub end_date: Option<String>,
    pub page: Option<u32>,
    #[serde(alias = "limit")]
    pub per_page: Option<u32>,
}

impl SearchDocumentsQuery {
    fn pagination(&self) -> PaginationQuery {
        PaginationQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }

    fn filter(&self) -> Result<DocumentFilter> {
        let uploaded_by = self
            .uploaded_by
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| {
                Uuid::parse_str(s)
                    .map_err(|_| AppError::Validation("uploaded_by must be a UUID".to_string()))
            })
            .transpose()?;

        Ok(DocumentFilter {
            title: non_empty(&self.title),
            tag: non_empty(&self.tag),
            uploaded_by,
            start_date: parse_date("start_date", &self.start_date)?,
            end_date: parse_date("end_date", &self.end_date)?,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_date(field: &str, value: &Option<String>) -> Result<Option<DateTime<Utc>>> {
    match value.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|_| AppError::Validation(format!("{} must be an RFC 3339 timestamp", field))),
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.chars().count() < MIN_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "Title must be at least {} characters",
            MIN_TITLE_LEN
        )));
    }
    Ok(())
}

fn validate_tag(tag: &str) -> Result<()> {
    if tag.chars().count() < MIN_TAG_LEN {
        return Err(AppError::Validation(format!(
            "Tag must be at least {} characters",
            MIN_TAG_LEN
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMetadataRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tag: Option<String>,
}

impl UpdateMetadataRequest {
    fn into_changes(self) -> Result<DocumentChanges> {
        let changes = DocumentChanges {
            title: self.title.map(|t| t.trim().to_string()),
            description: self.description,
            tag: self.tag.map(|t| t.trim().to_string()),
        };
        if let Some(title) = &changes.title {
            validate_title(title)?;
        }
        if let Some(tag) = &changes.tag {
            validate_tag(tag)?;
        }
        Ok(changes)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantPermissionRequest {
    pub user_id: Uuid,
    /// Defaults to true
    pub can_read: Option<bool>,
    pub can_update: Option<bool>,
    pub can_delete: Option<bool>,
}

impl GrantPermissionRequest {
    fn flags(&self) -> PermissionFlags {
        PermissionFlags {
            can_read: self.can_read.unwrap_or(true),
            can_update: self.can_update.unwrap_or(false),
            can_delete: self.can_delete.unwrap_or(false),
        }
    }
}

/// Multipart body of an upload, documented for OpenAPI
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadDocumentForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub title: String,
    pub description: Option<String>,
    pub tag: String,
}

struct UploadFields {
    file: Option<(String, Bytes)>,
    title: Option<String>,
    description: Option<String>,
    tag: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadFields> {
    let mut fields = UploadFields {
        file: None,
        title: None,
        description: None,
        tag: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;
                fields.file = Some((file_name, data));
            }
            "title" | "description" | "tag" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid field {name}: {e}")))?;
                let value = value.trim().to_string();
                match name.as_str() {
                    "title" => fields.title = Some(value),
                    "description" => fields.description = Some(value).filter(|v| !v.is_empty()),
                    _ => fields.tag = Some(value),
                }
            }
            _ => {}
        }
    }

    Ok(fields)
}

/// Upload a document
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/documents",
    tag = "documents",
    request_body(content = UploadDocumentForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Document uploaded", body = Document),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Role lacks CREATE_DOCUMENT"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_document(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let fields = read_upload(multipart).await?;

    let (file_name, content) = fields
        .file
        .ok_or_else(|| AppError::Validation("A file is required".to_string()))?;
    let title = fields
        .title
        .ok_or_else(|| AppError::Validation("Title is required".to_string()))?;
    let tag = fields
        .tag
        .ok_or_else(|| AppError::Validation("Tag is required".to_string()))?;
    validate_title(&title)?;
    validate_tag(&tag)?;

    let document = state
        .document_service
        .upload(UploadDocument {
            owner: auth.user_id,
            title,
            description: fields.description,
            tag,
            file_name,
            content,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(document)))
}

/// List documents, newest first
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/documents",
    tag = "documents",
    params(PaginationQuery),
    responses(
        (status = 200, description = "Page of documents", body = DocumentListResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_documents(
    State(state): State<SharedState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<DocumentListResponse>> {
    let page = state
        .document_service
        .list(query.page(), query.per_page())
        .await?;
    Ok(Json(DocumentListResponse::new(page, &query)))
}

/// Search documents; every given criterion must match
#[utoipa::path(
    get,
    path = "/search",
    context_path = "/api/v1/documents",
    tag = "documents",
    params(SearchDocumentsQuery),
    responses(
        (status = 200, description = "Matching documents", body = DocumentListResponse),
        (status = 400, description = "Malformed filter"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn search_documents(
    State(state): State<SharedState>,
    Query(query): Query<SearchDocumentsQuery>,
) -> Result<Json<DocumentListResponse>> {
    let filter = query.filter()?;
    let pagination = query.pagination();
    let page = state
        .document_service
        .search(&filter, pagination.page(), pagination.per_page())
        .await?;
    Ok(Json(DocumentListResponse::new(page, &pagination)))
}

/// Get a document's metadata
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/documents",
    tag = "documents",
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document", body = Document),
        (status = 404, description = "Document not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_document(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>> {
    Ok(Json(state.document_service.get(id).await?))
}

/// Update title, description or tag
#[utoipa::path(
    patch,
    path = "/{id}/metadata",
    context_path = "/api/v1/documents",
    tag = "documents",
    params(("id" = Uuid, Path, description = "Document ID")),
    request_body = UpdateMetadataRequest,
    responses(
        (status = 200, description = "Updated document", body = Document),
        (status = 403, description = "Not the owner, or role lacks UPDATE_DOCUMENT"),
        (status = 404, description = "Document not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_metadata(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMetadataRequest>,
) -> Result<Json<Document>> {
    let changes = payload.into_changes()?;
    Ok(Json(
        state.document_service.update_metadata(id, changes).await?,
    ))
}

/// Delete a document and its file
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/documents",
    tag = "documents",
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 403, description = "Not the owner, or role lacks DELETE_DOCUMENT"),
        (status = 404, description = "Document not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_document(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.document_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Grant a user an override on one document
#[utoipa::path(
    post,
    path = "/{id}/permissions",
    context_path = "/api/v1/documents",
    tag = "documents",
    params(("id" = Uuid, Path, description = "Document ID")),
    request_body = GrantPermissionRequest,
    responses(
        (status = 200, description = "Override stored", body = DocumentPermission),
        (status = 403, description = "Admin with MANAGE_PERMISSIONS required"),
        (status = 404, description = "Document or user not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn grant_permission(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GrantPermissionRequest>,
) -> Result<Json<DocumentPermission>> {
    let permission = state
        .permission_service
        .grant_document_permission(id, payload.user_id, payload.flags())
        .await?;
    Ok(Json(permission))
}

/// Remove a user's override on one document
#[utoipa::path(
    delete,
    path = "/{id}/permissions/{user_id}",
    context_path = "/api/v1/documents",
    tag = "documents",
    params(
        ("id" = Uuid, Path, description = "Document ID"),
        ("user_id" = Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 204, description = "Override removed"),
        (status = 403, description = "Admin with MANAGE_PERMISSIONS required"),
        (status = 404, description = "No such override"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke_permission(
    State(state): State<SharedState>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state
        .permission_service
        .revoke_document_permission(id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create a short-lived public download link
#[utoipa::path(
    get,
    path = "/{id}/download",
    context_path = "/api/v1/documents",
    tag = "documents",
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Download link", body = DownloadLink),
        (status = 404, description = "Document not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_download_link(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DownloadLink>> {
    Ok(Json(
        state.document_service.generate_download_link(id).await?,
    ))
}

/// Download a document through a link token
#[utoipa::path(
    get,
    path = "/download/{token}",
    context_path = "/api/v1/documents",
    tag = "documents",
    params(("token" = String, Path, description = "Download token")),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 401, description = "Invalid or expired link"),
        (status = 404, description = "Document or file not found"),
    )
)]
pub async fn download_document(
    State(state): State<SharedState>,
    Path(token): Path<String>,
) -> Result<DownloadResponse> {
    let (document, content) = state.document_service.open_download(&token).await?;
    Ok(DownloadResponse::attachment(
        content,
        document.download_filename(),
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_document,
        list_documents,
        search_documents,
        get_document,
        update_metadata,
        delete_document,
        grant_permission,
        revoke_permission,
        create_download_link,
        download_document,
    ),
    components(schemas(
        Document,
        DocumentListResponse,
        Pagination,
        UpdateMetadataRequest,
        GrantPermissionRequest,
        UploadDocumentForm,
        DocumentPermission,
        PermissionFlags,
        DownloadLink,
    ))
)]
pub struct DocumentsApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> SearchDocumentsQuery {
        SearchDocumentsQuery {
            title: None,
            tag: None,
            uploaded_by: None,
            start_date: None,
            end_date: None,
            page: None,
            per_page: None,
        }
    }

    #[test]
    fn test_search_filter_parsing() {
        let owner = Uuid::new_v4();
        let q = SearchDocumentsQuery {
            title: Some(" report ".into()),
            tag: Some(String::new()),
            uploaded_by: Some(owner.to_string()),
            start_date: Some("2024-01-01T00:00:00Z".into()),
            end_date: Some("2024-12-31T23:59:59+02:00".into()),
            ..query()
        };
        let filter = q.filter().unwrap();
        assert_eq!(filter.title.as_deref(), Some("report"));
        assert!(filter.tag.is_none());
        assert_eq!(filter.uploaded_by, Some(owner));
        assert_eq!(
            filter.end_date.unwrap().to_rfc3339(),
            "2024-12-31T21:59:59+00:00"
        );
    }

    #[test]
    fn test_search_rejects_malformed_input() {
        let bad_owner = SearchDocumentsQuery {
            uploaded_by: Some("alice".into()),
            ..query()
        };
        assert!(matches!(bad_owner.filter(), Err(AppError::Validation(_))));

        let bad_date = SearchDocumentsQuery {
            start_date: Some("yesterday".into()),
            ..query()
        };
        assert!(matches!(bad_date.filter(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_metadata_validation() {
        let short_title = UpdateMetadataRequest {
            title: Some("short".into()),
            description: None,
            tag: None,
        };
        assert!(short_title.into_changes().is_err());

        let short_tag = UpdateMetadataRequest {
            title: None,
            description: None,
            tag: Some("tax".into()),
        };
        assert!(short_tag.into_changes().is_err());

        let ok = UpdateMetadataRequest {
            title: Some("Annual summary".into()),
            description: Some("".into()),
            tag: None,
        }
        .into_changes()
        .unwrap();
        assert_eq!(ok.title.as_deref(), Some("Annual summary"));
    }

    #[test]
    fn test_grant_defaults() {
        let req: GrantPermissionRequest =
            serde_json::from_str(&format!(r#"{{"user_id":"{}"}}"#, Uuid::new_v4())).unwrap();
        assert_eq!(req.flags(), PermissionFlags::default());
    }
}

//! Common test utilities for backend API tests
//!
//! Builds the full router against the in-memory store and a temporary
//! storage directory, plus request helpers for the auth and document flows.

#![allow(dead_code)]

pub mod fixtures;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use doc_vault_backend::{
    api::{routes::create_router, AppState},
    config::Config,
    repositories::{memory::InMemoryStore, Repositories},
    storage::filesystem::FilesystemStorage,
};

use fixtures::{TestUpload, TestUser};

const BOUNDARY: &str = "doc-vault-test-boundary";

/// Decoded response
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub raw: Vec<u8>,
}

impl TestResponse {
    /// Every `Set-Cookie` header value.
    pub fn cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }
}

/// Tokens from a successful login
pub struct Session {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// A fully wired application backed by in-memory state
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub storage_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_env(&[]).await
    }

    /// Build with extra configuration variables on top of the test defaults.
    pub async fn with_env(extra: &[(&str, &str)]) -> Self {
        let storage_dir = TempDir::new().unwrap();
        let storage_path = storage_dir.path().to_string_lossy().to_string();

        let mut vars: HashMap<String, String> = HashMap::from([
            ("DATABASE_URL".into(), "postgres://unused".into()),
            ("ACCESS_TOKEN_SECRET".into(), "test-access-secret".into()),
            ("REFRESH_TOKEN_SECRET".into(), "test-refresh-secret".into()),
            ("DOWNLOAD_TOKEN_SECRET".into(), "test-download-secret".into()),
            ("SERVER_BASE_URL".into(), "http://localhost:8080".into()),
            ("STORAGE_PATH".into(), storage_path.clone()),
            ("BCRYPT_COST".into(), "4".into()),
        ]);
        for (key, value) in extra {
            vars.insert(key.to_string(), value.to_string());
        }
        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let storage = FilesystemStorage::new(storage_path);
        storage.init().await.unwrap();

        let store = Arc::new(InMemoryStore::seeded());
        let state = Arc::new(AppState::new(
            config,
            Repositories::in_memory(store.clone()),
            Arc::new(storage),
        ));

        Self {
            router: create_router(state),
            store,
            storage_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        let body = serde_json::from_slice(&raw).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
            raw,
        }
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.without_body(Method::GET, uri, token).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.without_body(Method::DELETE, uri, token).await
    }

    async fn without_body(&self, method: Method, uri: &str, token: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn register(&self, user: &TestUser) -> TestResponse {
        self.json(
            Method::POST,
            "/api/v1/users/register",
            None,
            serde_json::json!({
                "username": user.username,
                "email": user.email,
                "password": user.password,
                "role": user.role,
            }),
        )
        .await
    }

    pub async fn login(&self, user: &TestUser) -> TestResponse {
        self.json(
            Method::POST,
            "/api/v1/users/login",
            None,
            serde_json::json!({ "email": user.email, "password": user.password }),
        )
        .await
    }

    /// Register and log in, returning the session tokens.
    pub async fn sign_up(&self, user: &TestUser) -> Session {
        assert_eq!(self.register(user).await.status, StatusCode::CREATED);
        let response = self.login(user).await;
        assert_eq!(response.status, StatusCode::OK);
        Session {
            user_id: response.body["user"]["id"].as_str().unwrap().to_string(),
            access_token: response.body["access_token"].as_str().unwrap().to_string(),
            refresh_token: response.body["refresh_token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn upload(&self, token: &str, upload: &TestUpload) -> TestResponse {
        let mut fields = vec![("title", upload.title.as_str()), ("tag", upload.tag.as_str())];
        if let Some(description) = &upload.description {
            fields.push(("description", description.as_str()));
        }
        let body = multipart_body(&fields, Some((upload.file_name.as_str(), upload.content.as_slice())));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/documents")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Upload and return the new document's id.
    pub async fn upload_ok(&self, token: &str, upload: &TestUpload) -> String {
        let response = self.upload(token, upload).await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }

    /// Number of files in the storage directory.
    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(self.storage_dir.path()).unwrap().count()
    }
}

/// Encode text fields and an optional file as `multipart/form-data`.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

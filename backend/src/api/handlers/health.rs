//! Health check endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::api::SharedState;

const STORAGE_PROBE_KEY: &str = ".health-probe";

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub database: CheckStatus,
    pub storage: CheckStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckStatus {
    fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            message: None,
        }
    }

    fn unhealthy(message: String) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message),
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Database and storage readiness
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "All dependencies reachable", body = HealthResponse),
        (status = 503, description = "A dependency is down", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let database = match state.repositories.users.ping().await {
        Ok(()) => CheckStatus::healthy(),
        Err(e) => CheckStatus::unhealthy(format!("Database connection failed: {}", e)),
    };

    let storage = match state.storage.exists(STORAGE_PROBE_KEY).await {
        Ok(_) => CheckStatus::healthy(),
        Err(e) => CheckStatus::unhealthy(format!("Storage unavailable: {}", e)),
    };

    let healthy = database.is_healthy() && storage.is_healthy();
    if !healthy {
        tracing::warn!(?database, ?storage, "Health check failed");
    }

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks { database, storage },
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

/// Process liveness; touches no dependency
#[utoipa::path(
    get,
    path = "/livez",
    tag = "health",
    responses((status = 200, description = "Process is running"))
)]
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

#[derive(OpenApi)]
#[openapi(
    paths(health_check, liveness_check),
    components(schemas(HealthResponse, HealthChecks, CheckStatus))
)]
pub struct HealthApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            checks: HealthChecks {
                database: CheckStatus::healthy(),
                storage: CheckStatus::unhealthy("disk full".to_string()),
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json["checks"]["database"].get("message").is_none());
        assert_eq!(json["checks"]["storage"]["message"], "disk full");
    }
}

//! # API Handlers
//!
//! HTTP endpoint handlers for the tenant gateway.

use axum::extract::State;
use axum::response::Json;

use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod apps;
pub mod members;
pub mod query;
pub mod table_data;
pub mod table_structure;
pub mod tenants;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness/readiness probe backed by the platform directory connection.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy"),
        (status = 503, description = "Platform database unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    crate::db::health_check(&state.db).await.map_err(|e| {
        tracing::error!(error = %e, "Health check failed");
        ApiError::from(crate::error::ErrorType::ServiceUnavailable)
    })?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

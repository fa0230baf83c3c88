//! # Generated-App Provisioning Handler
//!
//! Entry point the app-generation pipeline calls once it has produced source
//! files: creates the tenant, provisions the database and applies the
//! extracted schema in one request.

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::provisioning::{AppDatabase, AppDatabaseProvisioner, ProvisionAppOptions};
use crate::schema::SourceFile;
use crate::server::AppState;

/// Request body for generated-app provisioning.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionAppRequest {
    pub app_id: String,
    pub app_name: String,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub app_files: Vec<SourceFile>,
}

/// Provision a database for a generated application.
#[utoipa::path(
    post,
    path = "/api/v1/apps/provision",
    request_body = ProvisionAppRequest,
    responses(
        (status = 200, description = "Database provisioned or already present", body = AppDatabase),
        (status = 401, description = "Missing caller identity", body = ApiError)
    ),
    tag = "apps"
)]
pub async fn provision_app_database(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ProvisionAppRequest>,
) -> Result<Json<AppDatabase>, ApiError> {
    if request.app_id.trim().is_empty() || request.app_name.trim().is_empty() {
        return Err(crate::error::validation_error(
            "Missing app identity",
            serde_json::json!({ "appId": "appId and appName are required" }),
        ));
    }

    let provisioner = AppDatabaseProvisioner::new(&state.db, &state.config.tenant_db);
    let database = provisioner
        .provision_database(ProvisionAppOptions {
            user_id: user.id,
            app_id: request.app_id,
            app_name: request.app_name,
            framework: request.framework,
            app_files: request.app_files,
        })
        .await?;

    Ok(Json(database))
}

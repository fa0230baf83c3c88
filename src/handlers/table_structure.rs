//! # Table Structure Handlers
//!
//! Read-only structure introspection plus a deliberately deferred update
//! endpoint: destructive structural changes (column drops, type changes) are
//! acknowledged but not applied, and callers must not assume they took
//! effect.

use axum::extract::{Path, State};
use axum::response::Json;
use sea_orm::JsonValue;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::AccessContext;
use crate::error::{ApiError, not_found};
use crate::query::{ColumnInfo, IndexInfo, TableRef, catalog};
use crate::server::AppState;

/// Response payload for structure reads.
#[derive(Debug, Serialize, ToSchema)]
pub struct TableStructureResponse {
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
}

/// Read the column and index structure of a tenant table.
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenant_id}/tables/{table_ref}/structure",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant identifier"),
        ("table_ref" = String, Path, description = "Schema-qualified table, e.g. public.users"),
    ),
    responses(
        (status = 200, description = "Table structure", body = TableStructureResponse),
        (status = 404, description = "Unknown tenant or table", body = ApiError)
    ),
    tag = "table-structure"
)]
pub async fn get_table_structure(
    State(state): State<AppState>,
    access: AccessContext,
    Path((_tenant_id, table_ref)): Path<(Uuid, String)>,
) -> Result<Json<TableStructureResponse>, ApiError> {
    let pool = state
        .pools
        .get_connection(access.tenant_id, access.db_mode)
        .await?;

    let table = TableRef::parse(&table_ref)?;
    let loaded = catalog::load_table_catalog(pool.handle(), &table)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| not_found(&format!("Table {}.{} not found", table.schema, table.table)))?;

    let indexes = catalog::fetch_indexes(pool.handle(), &table)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(TableStructureResponse {
        columns: loaded.columns,
        indexes,
    }))
}

/// Request body for structure updates (accepted, not yet applied).
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStructureRequest {
    #[serde(default)]
    pub columns: Option<JsonValue>,
    #[serde(default)]
    pub indexes: Option<JsonValue>,
    #[serde(default)]
    pub changes: Option<JsonValue>,
}

/// Acknowledgement payload for the deferred structure update.
#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateStructureResponse {
    pub success: bool,
    pub message: String,
}

/// Acknowledge a structure change request without applying it.
#[utoipa::path(
    put,
    path = "/api/v1/tenants/{tenant_id}/tables/{table_ref}/structure",
    request_body = UpdateStructureRequest,
    responses(
        (status = 200, description = "Change acknowledged but deferred", body = UpdateStructureResponse)
    ),
    tag = "table-structure"
)]
pub async fn update_table_structure(
    State(_state): State<AppState>,
    _access: AccessContext,
    Path((_tenant_id, _table_ref)): Path<(Uuid, String)>,
    Json(_request): Json<UpdateStructureRequest>,
) -> Json<UpdateStructureResponse> {
    // Structural changes need a migration plan (locks, rewrites, data loss);
    // the endpoint exists so clients get a stable contract, but it must not
    // pretend the change happened.
    Json(UpdateStructureResponse {
        success: true,
        message: "Table structure modification is not yet implemented. This feature is coming soon."
            .to_string(),
    })
}

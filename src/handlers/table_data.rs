//! # Table Data Handlers
//!
//! Paginated reads and row-level mutations against tenant tables. All
//! identifier positions are validated against the live catalog before they
//! reach SQL; values always travel as bound parameters.

use std::sync::LazyLock;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use regex::Regex;
use sea_orm::{ConnectionTrait, DbBackend, FromQueryResult, JsonValue, Statement};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::AccessContext;
use crate::error::{ApiError, not_found, sql_error_details, validation_error};
use crate::query::{
    ColumnFilter, ColumnInfo, FilterOperator, SortOrder, TableCatalog, TableDataParams, TableRef,
    build_delete, build_insert, build_table_query, build_update, catalog,
};
use crate::server::AppState;

/// Pagination metadata mirrored to clients.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_rows: u64,
    pub limit: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Response payload for a table data read.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableDataResponse {
    pub data: Vec<JsonValue>,
    pub total: u64,
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<String>,
    pub pagination: Pagination,
}

/// Response payload for row mutations.
#[derive(Debug, Serialize, ToSchema)]
pub struct MutationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

static FILTER_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^filter\[(\d+)\]\[(column|operator|value|enabled)\]$").expect("filter param regex")
});

/// Parse the flat query-string pairs into validated table data parameters.
fn parse_table_data_params(pairs: &[(String, String)]) -> Result<TableDataParams, ApiError> {
    let mut params = TableDataParams::default();
    let mut filters: std::collections::BTreeMap<usize, (Option<String>, Option<String>, String, bool)> =
        std::collections::BTreeMap::new();

    for (key, value) in pairs {
        match key.as_str() {
            "page" => {
                params.page = value.parse::<u64>().ok().filter(|p| *p > 0).ok_or_else(|| {
                    validation_error(
                        "Invalid pagination",
                        serde_json::json!({ "page": "must be a positive integer" }),
                    )
                })?;
            }
            "limit" => {
                params.limit = value.parse::<u64>().ok().filter(|l| *l > 0).ok_or_else(|| {
                    validation_error(
                        "Invalid pagination",
                        serde_json::json!({ "limit": "must be a positive integer" }),
                    )
                })?;
            }
            "search" => params.search = Some(value.clone()),
            "sort" => params.sort = Some(value.clone()),
            "order" => params.order = SortOrder::parse(value),
            _ => {
                if let Some(capture) = FILTER_PARAM_RE.captures(key) {
                    let index: usize = capture[1].parse().unwrap_or(0);
                    let entry = filters
                        .entry(index)
                        .or_insert((None, None, String::new(), true));
                    match &capture[2] {
                        "column" => entry.0 = Some(value.clone()),
                        "operator" => entry.1 = Some(value.clone()),
                        "value" => entry.2 = value.clone(),
                        "enabled" => entry.3 = value != "false" && value != "0",
                        _ => {}
                    }
                }
            }
        }
    }

    for (index, (column, operator, value, enabled)) in filters {
        let column = column.ok_or_else(|| {
            validation_error(
                "Malformed filter",
                serde_json::json!({ "filter": format!("filter[{}] is missing a column", index) }),
            )
        })?;
        let operator_raw = operator.unwrap_or_default();
        let operator = FilterOperator::parse(&operator_raw).ok_or_else(|| {
            validation_error(
                "Malformed filter",
                serde_json::json!({
                    "filter": format!("filter[{}] has unknown operator '{}'", index, operator_raw)
                }),
            )
        })?;

        params.filters.push(ColumnFilter {
            column,
            operator,
            value,
            enabled,
        });
    }

    Ok(params)
}

/// Resolve the catalog for a table or fail with 404.
async fn require_catalog(
    conn: &sea_orm::DatabaseConnection,
    table_ref: &str,
) -> Result<TableCatalog, ApiError> {
    let table = TableRef::parse(table_ref)?;
    let loaded = catalog::load_table_catalog(conn, &table)
        .await
        .map_err(ApiError::from)?;
    loaded.ok_or_else(|| not_found(&format!("Table {}.{} not found", table.schema, table.table)))
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    total: i64,
}

/// Read table rows with pagination, search, filters and sort.
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenant_id}/tables/{table_ref}/data",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant identifier"),
        ("table_ref" = String, Path, description = "Schema-qualified table, e.g. public.users"),
    ),
    responses(
        (status = 200, description = "Table rows and pagination", body = TableDataResponse),
        (status = 400, description = "Malformed parameters", body = ApiError),
        (status = 403, description = "Insufficient tenant permissions", body = ApiError),
        (status = 404, description = "Unknown tenant or table", body = ApiError)
    ),
    tag = "table-data"
)]
pub async fn get_table_data(
    State(state): State<AppState>,
    access: AccessContext,
    Path((_tenant_id, table_ref)): Path<(Uuid, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<TableDataResponse>, ApiError> {
    let params = parse_table_data_params(&pairs)?;

    let pool = state
        .pools
        .get_connection(access.tenant_id, access.db_mode)
        .await?;

    let catalog = require_catalog(pool.handle(), &table_ref).await?;
    let built = build_table_query(&catalog, &params)?;

    let data_stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        built.data_sql.clone(),
        built.data_values.clone(),
    );
    let rows = JsonValue::find_by_statement(data_stmt)
        .all(pool.handle())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Table data query failed");
            ApiError::from(e)
        })?;

    let count_stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        built.count_sql.clone(),
        built.count_values.clone(),
    );
    let total = CountRow::find_by_statement(count_stmt)
        .one(pool.handle())
        .await
        .map_err(ApiError::from)?
        .map(|row| row.total.max(0) as u64)
        .unwrap_or(0);

    let total_pages = total.div_ceil(params.limit);
    let primary_keys = catalog
        .primary_keys()
        .into_iter()
        .map(String::from)
        .collect();

    Ok(Json(TableDataResponse {
        data: rows,
        total,
        columns: catalog.columns.clone(),
        primary_keys,
        pagination: Pagination {
            current_page: params.page,
            total_pages,
            total_rows: total,
            limit: params.limit,
            has_next: params.page < total_pages,
            has_prev: params.page > 1,
        },
    }))
}

/// Request body for row insertion.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InsertRowRequest {
    pub data: Map<String, JsonValue>,
}

/// Insert one row.
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/tables/{table_ref}/data",
    request_body = InsertRowRequest,
    responses(
        (status = 200, description = "Row inserted", body = MutationResponse),
        (status = 400, description = "Unknown column or malformed body", body = ApiError)
    ),
    tag = "table-data"
)]
pub async fn insert_table_data(
    State(state): State<AppState>,
    access: AccessContext,
    Path((_tenant_id, table_ref)): Path<(Uuid, String)>,
    Json(request): Json<InsertRowRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    if request.data.is_empty() {
        return Err(validation_error(
            "Missing row data",
            serde_json::json!({ "data": "at least one column is required" }),
        ));
    }

    let pool = state
        .pools
        .get_connection(access.tenant_id, access.db_mode)
        .await?;
    let catalog = require_catalog(pool.handle(), &table_ref).await?;

    let (sql, values) = build_insert(&catalog, &request.data)?;
    let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);

    let inserted = JsonValue::find_by_statement(stmt)
        .one(pool.handle())
        .await
        .map_err(|e| {
            let details = sql_error_details(&e);
            tracing::error!(error = %details.message, "Row insert failed");
            ApiError::from(e)
        })?;

    Ok(Json(MutationResponse {
        success: true,
        message: "Row inserted successfully".to_string(),
        data: inserted,
    }))
}

/// Request body for row updates: the original primary key values address the
/// row, the data map carries the edits.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRowRequest {
    pub primary_keys: Vec<String>,
    pub data: Map<String, JsonValue>,
    pub original_data: Map<String, JsonValue>,
}

/// Update one row addressed by its primary key.
#[utoipa::path(
    put,
    path = "/api/v1/tenants/{tenant_id}/tables/{table_ref}/data",
    request_body = UpdateRowRequest,
    responses(
        (status = 200, description = "Row updated", body = MutationResponse),
        (status = 404, description = "No row matched the primary key", body = ApiError)
    ),
    tag = "table-data"
)]
pub async fn update_table_data(
    State(state): State<AppState>,
    access: AccessContext,
    Path((_tenant_id, table_ref)): Path<(Uuid, String)>,
    Json(request): Json<UpdateRowRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    if request.primary_keys.is_empty() || request.data.is_empty() {
        return Err(validation_error(
            "Missing required parameters",
            serde_json::json!({ "body": "primaryKeys and data are required" }),
        ));
    }

    let pool = state
        .pools
        .get_connection(access.tenant_id, access.db_mode)
        .await?;
    let catalog = require_catalog(pool.handle(), &table_ref).await?;

    let (sql, values) = build_update(
        &catalog,
        &request.primary_keys,
        &request.data,
        &request.original_data,
    )?;
    let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);

    let result = pool.handle().execute(stmt).await.map_err(|e| {
        let details = sql_error_details(&e);
        tracing::error!(error = %details.message, "Row update failed");
        ApiError::from(e)
    })?;

    if result.rows_affected() == 0 {
        return Err(not_found("Row not found"));
    }

    Ok(Json(MutationResponse {
        success: true,
        message: "Row updated successfully".to_string(),
        data: None,
    }))
}

/// Request body for row deletion.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRowRequest {
    pub primary_keys: Vec<String>,
    pub data: Map<String, JsonValue>,
}

/// Delete one row addressed by its primary key.
#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{tenant_id}/tables/{table_ref}/data",
    request_body = DeleteRowRequest,
    responses(
        (status = 200, description = "Row deleted", body = MutationResponse),
        (status = 404, description = "No row matched the primary key", body = ApiError)
    ),
    tag = "table-data"
)]
pub async fn delete_table_data(
    State(state): State<AppState>,
    access: AccessContext,
    Path((_tenant_id, table_ref)): Path<(Uuid, String)>,
    Json(request): Json<DeleteRowRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    if request.primary_keys.is_empty() {
        return Err(validation_error(
            "Missing required parameters",
            serde_json::json!({ "body": "primaryKeys and data are required" }),
        ));
    }

    let pool = state
        .pools
        .get_connection(access.tenant_id, access.db_mode)
        .await?;
    let catalog = require_catalog(pool.handle(), &table_ref).await?;

    let (sql, values) = build_delete(&catalog, &request.primary_keys, &request.data)?;
    let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);

    let result = pool.handle().execute(stmt).await.map_err(ApiError::from)?;

    if result.rows_affected() == 0 {
        return Err(not_found("Row not found"));
    }

    Ok(Json(MutationResponse {
        success: true,
        message: "Row deleted successfully".to_string(),
        data: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_no_params() {
        let params = parse_table_data_params(&[]).unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, 20);
        assert!(params.search.is_none());
        assert!(params.filters.is_empty());
    }

    #[test]
    fn page_and_limit_must_be_positive() {
        assert!(parse_table_data_params(&pairs(&[("page", "0")])).is_err());
        assert!(parse_table_data_params(&pairs(&[("limit", "0")])).is_err());
        assert!(parse_table_data_params(&pairs(&[("page", "-3")])).is_err());
        assert!(parse_table_data_params(&pairs(&[("page", "abc")])).is_err());
    }

    #[test]
    fn filters_are_parsed_from_indexed_params() {
        let params = parse_table_data_params(&pairs(&[
            ("filter[0][column]", "status"),
            ("filter[0][operator]", "eq"),
            ("filter[0][value]", "active"),
            ("filter[1][column]", "age"),
            ("filter[1][operator]", "gte"),
            ("filter[1][value]", "18"),
            ("filter[1][enabled]", "false"),
        ]))
        .unwrap();

        assert_eq!(params.filters.len(), 2);
        assert_eq!(params.filters[0].column, "status");
        assert_eq!(params.filters[0].operator, FilterOperator::Eq);
        assert!(params.filters[0].enabled);
        assert!(!params.filters[1].enabled);
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let result = parse_table_data_params(&pairs(&[
            ("filter[0][column]", "status"),
            ("filter[0][operator]", "between"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn filter_without_column_is_rejected() {
        let result = parse_table_data_params(&pairs(&[("filter[0][operator]", "eq")]));
        assert!(result.is_err());
    }

    #[test]
    fn sort_order_parses_from_query() {
        let params =
            parse_table_data_params(&pairs(&[("sort", "name"), ("order", "desc")])).unwrap();
        assert_eq!(params.sort.as_deref(), Some("name"));
        assert_eq!(params.order, SortOrder::Desc);
    }
}

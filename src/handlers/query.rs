//! # Raw Query Handler
//!
//! Executes caller-supplied SQL against the tenant database. Reads run in
//! read-only mode; any non-SELECT/WITH statement requires at least the editor
//! role and runs read-write. A fixed deny-list rejects catastrophic
//! statements regardless of role. Engine errors are surfaced with their
//! hint/position metadata to aid debugging, never swallowed.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use sea_orm::JsonValue;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::access::AccessContext;
use crate::error::{ApiError, forbidden, sql_error_details, validation_error};
use crate::membership::{DbMode, TenantRole, is_role_at_least};
use crate::pool::{RawQueryOutcome, execute_with_timeouts};
use crate::server::AppState;

/// Statements rejected outright, regardless of the caller's role.
const DENIED_SQL_FRAGMENTS: &[&str] = &[
    "drop database",
    "drop schema",
    "truncate",
    "delete from pg_",
];

/// Request body carrying the SQL to execute.
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    pub sql: String,
}

/// Successful query execution payload.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<JsonValue>>,
    pub row_count: u64,
    pub execution_time_ms: u64,
    pub command: &'static str,
}

/// Failed query execution payload with engine metadata.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    pub execution_time_ms: u64,
}

/// Returns true for statements the read path may execute.
fn is_read_statement(lowered: &str) -> bool {
    lowered.starts_with("select") || lowered.starts_with("with")
}

/// Deny-list check on the lowered statement text.
fn is_denied(lowered: &str) -> bool {
    DENIED_SQL_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

/// Execute raw SQL against the tenant database.
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query executed", body = QueryResponse),
        (status = 400, description = "Denied statement or engine error", body = QueryErrorResponse),
        (status = 403, description = "Write query without editor role", body = ApiError)
    ),
    tag = "query"
)]
pub async fn execute_query(
    State(state): State<AppState>,
    access: AccessContext,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, axum::response::Response> {
    let sql = request.sql.trim();
    if sql.is_empty() {
        return Err(into_response(validation_error(
            "SQL query is required",
            serde_json::json!({ "sql": "must not be empty" }),
        )));
    }

    let lowered = sql.to_lowercase();

    if is_denied(&lowered) {
        return Err(into_response(validation_error(
            "Dangerous SQL operations are not allowed",
            serde_json::json!({ "sql": "statement matches the deny-list" }),
        )));
    }

    let is_read = is_read_statement(&lowered);

    if !is_read && !is_role_at_least(access.role, TenantRole::Editor) {
        return Err(into_response(forbidden(Some(
            "Insufficient tenant permissions for write queries",
        ))));
    }

    // Mode is statement-driven here: reads run read-only even for admins.
    let mode = if is_read {
        DbMode::ReadOnly
    } else {
        DbMode::ReadWrite
    };

    let pool = state
        .pools
        .get_connection(access.tenant_id, mode)
        .await
        .map_err(|e| into_response(ApiError::from(e)))?;

    let started = Instant::now();
    let outcome = execute_with_timeouts(pool.handle(), state.pools.config(), sql, is_read).await;
    let execution_time_ms = started.elapsed().as_millis() as u64;
    metrics::histogram!("tenant_query_duration_ms").record(execution_time_ms as f64);

    match outcome {
        Ok(RawQueryOutcome::Rows(rows)) => Ok(Json(QueryResponse {
            success: true,
            row_count: rows.len() as u64,
            data: Some(rows),
            execution_time_ms,
            command: "SELECT",
        })),
        Ok(RawQueryOutcome::Affected(count)) => Ok(Json(QueryResponse {
            success: true,
            data: None,
            row_count: count,
            execution_time_ms,
            command: "MODIFY",
        })),
        Err(e) => {
            let details = sql_error_details(&e);
            tracing::warn!(
                tenant_id = %access.tenant_id,
                error = %details.message,
                "Raw query failed"
            );
            let body = QueryErrorResponse {
                success: false,
                error: details.message,
                hint: details.hint,
                position: details.position,
                execution_time_ms,
            };
            Err(into_error_response(body))
        }
    }
}

fn into_response(error: ApiError) -> axum::response::Response {
    use axum::response::IntoResponse;
    error.into_response()
}

fn into_error_response(body: QueryErrorResponse) -> axum::response::Response {
    use axum::response::IntoResponse;
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_and_cte_are_read_statements() {
        assert!(is_read_statement("select * from users"));
        assert!(is_read_statement("with t as (select 1) select * from t"));
        assert!(!is_read_statement("update users set x = 1"));
        assert!(!is_read_statement("insert into users values (1)"));
    }

    #[test]
    fn deny_list_matches_anywhere_in_statement() {
        assert!(is_denied("drop database tenants"));
        assert!(is_denied("select 1; drop schema public"));
        assert!(is_denied("truncate users"));
        assert!(is_denied("delete from pg_catalog.pg_class"));
    }

    #[test]
    fn ordinary_statements_pass_deny_list() {
        assert!(!is_denied("select * from orders"));
        assert!(!is_denied("delete from orders where id = 1"));
        assert!(!is_denied("create table widgets (id int)"));
    }
}

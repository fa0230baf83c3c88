//! # Tenant Lifecycle Handlers
//!
//! Self-serve project creation (first project per user, idempotent),
//! plan-gated additional projects, tenant listing and soft deletion. The
//! first-project flow takes a cross-process advisory lock keyed by the user
//! id so rapid client retries collapse into one created tenant.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use rand::Rng;
use sea_orm::{ConnectionTrait, DbBackend, Statement, TransactionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, insufficient_plan, not_found};
use crate::membership::global_operator_role;
use crate::provisioning::{ProvisionedDatabase, ProvisioningOrchestrator};
use crate::repositories::{
    CreateTenantParams, MembershipRepository, TenantRepository, TenantWithRole,
};
use crate::server::AppState;

/// Request body for self-serve project creation.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SelfProvisionRequest {
    pub name: Option<String>,
    pub subdomain: Option<String>,
    pub plan_type: Option<String>,
    /// Desired database password; when omitted one is generated and returned
    /// exactly once.
    pub db_password: Option<String>,
}

/// Response for provisioning endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct TenantProvisionResponse {
    pub created: bool,
    pub tenant: TenantWithRole,
    pub database: ProvisionedDatabase,
    /// Present only when a credential was created right now and the caller
    /// did not supply one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_password: Option<String>,
}

fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_dash = false;
    for c in input.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_dash = false;
        } else if !prev_dash && !out.is_empty() {
            out.push('-');
            prev_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

fn default_project_name(email: Option<&str>) -> String {
    let local = email.unwrap_or("").split('@').next().unwrap_or("");
    let base = local.replace(['.', '_', '-'], " ");
    let base = base.trim();
    if base.is_empty() {
        "Personal Project".to_string()
    } else {
        format!("{} Project", base)
    }
}

/// Random suffix from an alphabet without confusable characters.
fn random_suffix(length: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

async fn select_tenant_with_role<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    user_id: Uuid,
) -> Result<Option<TenantWithRole>, sea_orm::DbErr> {
    use sea_orm::FromQueryResult;

    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"
        SELECT t.id, t.name, t.subdomain, t.plan_type, t.status, tm.role, t.created_at
        FROM tenant_members tm
        JOIN tenants t ON t.id = tm.tenant_id
        WHERE tm.user_id = $1 AND tm.tenant_id = $2
        LIMIT 1
        "#,
        [user_id.into(), tenant_id.into()],
    );
    TenantWithRole::find_by_statement(stmt).one(conn).await
}

/// Find the user's first tenant or create one with owner membership, under a
/// per-user advisory lock.
async fn ensure_self_tenant(
    state: &AppState,
    user: &AuthenticatedUser,
    request: &SelfProvisionRequest,
) -> Result<(TenantWithRole, bool), ApiError> {
    let txn = state.db.begin().await.map_err(ApiError::from)?;

    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1))",
        [user.id.to_string().into()],
    ))
    .await
    .map_err(ApiError::from)?;

    if let Some(existing) = TenantRepository::earliest_tenant_for_user(&txn, user.id)
        .await
        .map_err(ApiError::from)?
    {
        txn.commit().await.map_err(ApiError::from)?;
        return Ok((existing, false));
    }

    let tenant_id = Uuid::new_v4();
    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .unwrap_or_else(|| default_project_name(user.email.as_deref()));
    TenantRepository::validate_tenant_name(&name)
        .map_err(|msg| crate::error::validation_error(&msg, serde_json::json!({ "name": msg.clone() })))?;

    let plan_type = request
        .plan_type
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("free")
        .to_string();

    let base_subdomain = request
        .subdomain
        .as_deref()
        .map(slugify)
        .filter(|s| !s.is_empty())
        .or_else(|| Some(slugify(&name)).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "project".to_string());
    let subdomain: String = format!("{}-{}", base_subdomain, random_suffix(6))
        .chars()
        .take(60)
        .collect();

    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"
        INSERT INTO tenants (id, name, subdomain, plan_type, status, connection_info)
        VALUES ($1, $2, $3, $4, 'active', '{}'::jsonb)
        "#,
        [
            tenant_id.into(),
            name.into(),
            subdomain.into(),
            plan_type.into(),
        ],
    ))
    .await
    .map_err(ApiError::from)?;

    MembershipRepository::upsert_member_on(
        &txn,
        tenant_id,
        user.id,
        crate::membership::TenantRole::Owner,
    )
    .await
    .map_err(ApiError::from)?;

    let created = select_tenant_with_role(&txn, tenant_id, user.id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| crate::error::downstream_failure("Tenant creation readback failed"))?;

    txn.commit().await.map_err(ApiError::from)?;

    tracing::info!(tenant_id = %tenant_id, user_id = %user.id, "Created self-serve tenant");
    Ok((created, true))
}

/// Create the caller's first project and ensure its database exists.
#[utoipa::path(
    post,
    path = "/api/v1/tenants/self",
    request_body = SelfProvisionRequest,
    responses(
        (status = 201, description = "Project created and provisioned", body = TenantProvisionResponse),
        (status = 200, description = "Existing project returned", body = TenantProvisionResponse),
        (status = 401, description = "Missing caller identity", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn self_provision(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    request: Option<Json<SelfProvisionRequest>>,
) -> Result<(StatusCode, Json<TenantProvisionResponse>), ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let (tenant, created) = ensure_self_tenant(&state, &user, &request).await?;

    // After project creation the database must be ready to use.
    let orchestrator = ProvisioningOrchestrator::new(&state.db, &state.config.tenant_db);
    let provision = orchestrator
        .ensure_tenant_database_provisioned(tenant.id, request.db_password.as_deref())
        .await?;

    let database_password = if provision.provisioned && request.db_password.is_none() {
        provision.password.clone()
    } else {
        None
    };

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(TenantProvisionResponse {
            created,
            tenant,
            database: provision.db,
            database_password,
        }),
    ))
}

/// Request body for additional project creation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    pub name: String,
    pub subdomain: Option<String>,
    pub plan_type: Option<String>,
    pub region: Option<String>,
    pub db_password: Option<String>,
}

/// Create an additional project; gated on a paid plan or operator bypass.
#[utoipa::path(
    post,
    path = "/api/v1/tenants/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created and provisioned", body = TenantProvisionResponse),
        (status = 402, description = "Additional projects need a paid plan", body = ApiError),
        (status = 401, description = "Missing caller identity", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn create_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<TenantProvisionResponse>), ApiError> {
    let tenants = TenantRepository::new(&state.db);

    // Operators may create projects freely; everyone else needs a paid plan.
    let operator = global_operator_role(&user).is_some();
    if !operator && !tenants.has_paid_tenant(user.id).await.map_err(ApiError::from)? {
        return Err(insufficient_plan(
            "Additional projects require a paid plan",
        ));
    }

    let name = request.name.trim().to_string();
    TenantRepository::validate_tenant_name(&name)
        .map_err(|msg| crate::error::validation_error(&msg, serde_json::json!({ "name": msg.clone() })))?;

    let base_subdomain = request
        .subdomain
        .as_deref()
        .map(slugify)
        .filter(|s| !s.is_empty())
        .or_else(|| Some(slugify(&name)).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "project".to_string());
    let subdomain: String = format!("{}-{}", base_subdomain, random_suffix(6))
        .chars()
        .take(60)
        .collect();

    let tenant_id = Uuid::new_v4();
    tenants
        .create_tenant(CreateTenantParams {
            id: tenant_id,
            name,
            subdomain: Some(subdomain),
            plan_type: request.plan_type.clone(),
            region: request.region.clone(),
        })
        .await
        .map_err(ApiError::from)?;

    MembershipRepository::new(&state.db)
        .upsert_member(tenant_id, user.id, crate::membership::TenantRole::Owner)
        .await
        .map_err(ApiError::from)?;

    let orchestrator = ProvisioningOrchestrator::new(&state.db, &state.config.tenant_db);
    let provision = orchestrator
        .ensure_tenant_database_provisioned(tenant_id, request.db_password.as_deref())
        .await?;

    let tenant = select_tenant_with_role(&state.db, tenant_id, user.id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| crate::error::downstream_failure("Tenant creation readback failed"))?;

    let database_password = if provision.provisioned && request.db_password.is_none() {
        provision.password.clone()
    } else {
        None
    };

    Ok((
        StatusCode::CREATED,
        Json(TenantProvisionResponse {
            created: true,
            tenant,
            database: provision.db,
            database_password,
        }),
    ))
}

/// Listing payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct TenantListResponse {
    pub tenants: Vec<TenantWithRole>,
}

/// List the caller's tenants, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/tenants",
    responses(
        (status = 200, description = "Tenants the caller belongs to", body = TenantListResponse),
        (status = 401, description = "Missing caller identity", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn list_tenants(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<TenantListResponse>, ApiError> {
    let tenants = TenantRepository::new(&state.db)
        .list_tenants_for_user(user.id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(TenantListResponse { tenants }))
}

/// Soft-delete acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteTenantResponse {
    pub success: bool,
    pub message: String,
}

/// Soft-delete a tenant: a one-way status transition in the directory.
/// Underlying database/role cleanup is an out-of-band operational task.
#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{tenant_id}",
    params(("tenant_id" = Uuid, Path, description = "Tenant identifier")),
    responses(
        (status = 200, description = "Tenant marked deleted", body = DeleteTenantResponse),
        (status = 404, description = "Unknown or already deleted tenant", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn delete_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<DeleteTenantResponse>, ApiError> {
    let marked = TenantRepository::new(&state.db)
        .mark_deleted(tenant_id)
        .await
        .map_err(ApiError::from)?;

    if !marked {
        return Err(not_found("Tenant not found"));
    }

    tracing::info!(tenant_id = %tenant_id, "Tenant marked deleted (database retained)");

    Ok(Json(DeleteTenantResponse {
        success: true,
        message: "Tenant marked deleted; database cleanup is an operational task".to_string(),
    }))
}

//! # Membership Handlers
//!
//! Admin-gated member management: list, invite/role-change (upsert), revoke.

use axum::extract::{Path, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::AccessContext;
use crate::error::{ApiError, not_found};
use crate::membership::{TenantRole, normalize_role};
use crate::models::tenant_member::Model as MemberModel;
use crate::repositories::MembershipRepository;
use crate::server::AppState;

/// One membership row as returned to clients.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub user_id: Uuid,
    pub role: String,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
}

impl From<MemberModel> for MemberDto {
    fn from(model: MemberModel) -> Self {
        Self {
            user_id: model.user_id,
            role: model.role,
            created_at: model.created_at,
        }
    }
}

/// Listing payload.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberListResponse {
    pub tenant_id: Uuid,
    pub members: Vec<MemberDto>,
}

/// List members of a tenant, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenant_id}/members",
    params(("tenant_id" = Uuid, Path, description = "Tenant identifier")),
    responses(
        (status = 200, description = "Tenant members", body = MemberListResponse),
        (status = 403, description = "Admin role required", body = ApiError)
    ),
    tag = "members"
)]
pub async fn list_members(
    State(state): State<AppState>,
    access: AccessContext,
) -> Result<Json<MemberListResponse>, ApiError> {
    let members = MembershipRepository::new(&state.db)
        .list_members(access.tenant_id)
        .await
        .map_err(ApiError::from)?
        .into_iter()
        .map(MemberDto::from)
        .collect();

    Ok(Json(MemberListResponse {
        tenant_id: access.tenant_id,
        members,
    }))
}

/// Request body for invites and role changes.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertMemberRequest {
    pub user_id: Uuid,
    /// One of `viewer`, `editor`, `admin`, `owner`; unknown values degrade to
    /// viewer.
    pub role: Option<String>,
}

/// Upsert acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertMemberResponse {
    pub success: bool,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: TenantRole,
}

/// Invite a user or change their role (upsert semantics).
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/members",
    request_body = UpsertMemberRequest,
    responses(
        (status = 200, description = "Membership upserted", body = UpsertMemberResponse),
        (status = 403, description = "Admin role required", body = ApiError)
    ),
    tag = "members"
)]
pub async fn upsert_member(
    State(state): State<AppState>,
    access: AccessContext,
    Json(request): Json<UpsertMemberRequest>,
) -> Result<Json<UpsertMemberResponse>, ApiError> {
    let role = request
        .role
        .as_deref()
        .map(normalize_role)
        .unwrap_or(TenantRole::Viewer);

    MembershipRepository::new(&state.db)
        .upsert_member(access.tenant_id, request.user_id, role)
        .await
        .map_err(ApiError::from)?;

    tracing::info!(
        tenant_id = %access.tenant_id,
        user_id = %request.user_id,
        role = %role,
        "Membership upserted"
    );

    Ok(Json(UpsertMemberResponse {
        success: true,
        tenant_id: access.tenant_id,
        user_id: request.user_id,
        role,
    }))
}

/// Request body for membership revocation.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMemberRequest {
    pub user_id: Uuid,
}

/// Revocation acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct RemoveMemberResponse {
    pub success: bool,
    pub message: String,
}

/// Revoke a membership.
#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{tenant_id}/members",
    request_body = RemoveMemberRequest,
    responses(
        (status = 200, description = "Membership removed", body = RemoveMemberResponse),
        (status = 404, description = "No such membership", body = ApiError)
    ),
    tag = "members"
)]
pub async fn remove_member(
    State(state): State<AppState>,
    access: AccessContext,
    Json(request): Json<RemoveMemberRequest>,
) -> Result<Json<RemoveMemberResponse>, ApiError> {
    let removed = MembershipRepository::new(&state.db)
        .remove_member(access.tenant_id, request.user_id)
        .await
        .map_err(ApiError::from)?;

    if !removed {
        return Err(not_found("Membership not found"));
    }

    Ok(Json(RemoveMemberResponse {
        success: true,
        message: "Membership removed".to_string(),
    }))
}

//! # Tenant Access Gate
//!
//! Route-level middleware that resolves the caller's tenant role and attaches
//! a request-scoped [`AccessContext`]. Gates compose: when an upstream gate on
//! the same route already resolved access for the tenant, only the role floor
//! is re-checked, avoiding duplicate membership queries.

use axum::{
    extract::{FromRequestParts, RawPathParams, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, forbidden, unauthorized, validation_error};
use crate::membership::{DbMode, TenantMembershipService, TenantRole, is_role_at_least};
use crate::server::AppState;

/// Request-scoped access decision: which tenant, what role, and the database
/// mode queries must run under. Never persisted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccessContext {
    pub tenant_id: Uuid,
    pub role: TenantRole,
    pub db_mode: DbMode,
}

impl AccessContext {
    pub fn new(tenant_id: Uuid, role: TenantRole) -> Self {
        Self {
            tenant_id,
            role,
            db_mode: role.db_mode(),
        }
    }
}

/// Gate requiring at least `viewer` within the tenant.
pub async fn require_tenant_viewer(
    state: State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require_tenant_access(state, TenantRole::Viewer, request, next).await
}

/// Gate requiring at least `editor` within the tenant.
pub async fn require_tenant_editor(
    state: State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require_tenant_access(state, TenantRole::Editor, request, next).await
}

/// Gate requiring at least `admin` within the tenant.
pub async fn require_tenant_admin(
    state: State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require_tenant_access(state, TenantRole::Admin, request, next).await
}

async fn require_tenant_access(
    State(state): State<AppState>,
    min_role: TenantRole,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();

    let tenant_id = extract_tenant_id(&mut parts, &state).await?;

    let user = parts.extensions.get::<AuthenticatedUser>().cloned();

    // If an upstream gate already resolved access for this tenant, only the
    // floor needs re-checking.
    if let Some(existing) = parts.extensions.get::<AccessContext>()
        && existing.tenant_id == tenant_id
    {
        if !is_role_at_least(existing.role, min_role) {
            return Err(insufficient_role(min_role));
        }
        let request = Request::from_parts(parts, body);
        return Ok(next.run(request).await);
    }

    // Development profile: skip membership enforcement but still attach a
    // context so downstream mode selection works.
    if state.config.is_development() {
        parts
            .extensions
            .insert(AccessContext::new(tenant_id, TenantRole::Owner));
        let request = Request::from_parts(parts, body);
        return Ok(next.run(request).await);
    }

    let Some(user) = user else {
        return Err(unauthorized(Some("Authentication required")));
    };

    let membership = TenantMembershipService::new(&state.db);
    let role = membership
        .resolve_role(tenant_id, &user, true)
        .await
        .map_err(|e| {
            tracing::error!(tenant_id = %tenant_id, error = %e, "Tenant access check failed");
            ApiError::from(e)
        })?;

    let Some(role) = role else {
        return Err(forbidden(Some("You are not a member of this tenant")));
    };

    if !is_role_at_least(role, min_role) {
        return Err(insufficient_role(min_role));
    }

    parts.extensions.insert(AccessContext::new(tenant_id, role));

    let request = Request::from_parts(parts, body);
    Ok(next.run(request).await)
}

fn insufficient_role(min_role: TenantRole) -> ApiError {
    forbidden(Some("Insufficient tenant permissions"))
        .with_details(serde_json::json!({ "requiredRole": min_role.as_str() }))
}

async fn extract_tenant_id(parts: &mut Parts, state: &AppState) -> Result<Uuid, ApiError> {
    let params = RawPathParams::from_request_parts(parts, state)
        .await
        .map_err(|_| {
            validation_error(
                "Missing tenant id",
                serde_json::json!({ "tenantId": "Missing tenantId in route params" }),
            )
        })?;

    let raw = params
        .iter()
        .find(|(key, _)| *key == "tenant_id")
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_default();

    if raw.is_empty() {
        return Err(validation_error(
            "Missing tenant id",
            serde_json::json!({ "tenantId": "Missing tenantId in route params" }),
        ));
    }

    raw.parse::<Uuid>().map_err(|_| {
        validation_error(
            "Invalid tenant id",
            serde_json::json!({ "tenantId": "Must be a valid UUID" }),
        )
    })
}

impl<S> FromRequestParts<S> for AccessContext
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AccessContext>().cloned().ok_or_else(|| {
            validation_error(
                "Tenant context missing",
                serde_json::json!({ "tenantAccess": "Access context not resolved for this route" }),
            )
        })
    }
}

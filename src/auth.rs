//! # Gateway Authentication
//!
//! End users authenticate against the out-of-scope web layer; that layer
//! calls this gateway with a shared bearer token and forwards the resolved
//! identity in `X-User-*` headers. This module validates the bearer token in
//! constant time and materializes the forwarded identity for downstream
//! access checks.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, validation_error};
use crate::server::AppState;

/// Caller identity as resolved by the upstream authentication layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Stable user identifier
    pub id: Uuid,
    /// Email address, when the upstream layer forwarded one
    pub email: Option<String>,
    /// Platform-global role (e.g. `admin` for operators), distinct from
    /// per-tenant roles
    pub global_role: Option<String>,
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Authentication middleware: validates the service bearer token, then
/// attaches the forwarded user identity (when present) to the request.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();

    let token = extract_bearer_token(&headers)?;
    validate_token(&config, token)?;

    let mut request = request;
    if let Some(user) = extract_forwarded_user(&headers)? {
        tracing::debug!(user_id = %user.id, "Authenticated forwarded identity");
        request.extensions_mut().insert(user);
    }

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| unauthorized(Some("Invalid Authorization header")))
        })
        .and_then(|header| {
            header
                .strip_prefix("Bearer ")
                .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
        })
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .gateway_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

/// Parse the `X-User-*` identity headers. Absence of `X-User-Id` means the
/// request carries no end-user identity (anonymous service call); a present
/// but malformed id is a client error.
fn extract_forwarded_user(headers: &HeaderMap) -> Result<Option<AuthenticatedUser>, ApiError> {
    let Some(raw_id) = headers.get("X-User-Id") else {
        return Ok(None);
    };

    let raw_id = raw_id.to_str().map_err(|_| {
        validation_error(
            "Invalid user header",
            serde_json::json!({ "X-User-Id": "Header must be valid UTF-8" }),
        )
    })?;

    let id = raw_id.parse::<Uuid>().map_err(|_| {
        validation_error(
            "Invalid user ID",
            serde_json::json!({ "X-User-Id": "Must be a valid UUID" }),
        )
    })?;

    let email = headers
        .get("X-User-Email")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let global_role = headers
        .get("X-User-Role")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    Ok(Some(AuthenticatedUser {
        id,
        email,
        global_role,
    }))
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| unauthorized(Some("User identity required")))
    }
}

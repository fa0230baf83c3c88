//! Access-gate middleware behavior exercised through an in-process router.

use std::sync::Arc;

use axum::{
    Extension, Router,
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
};
use sea_orm::DatabaseConnection;
use tower::ServiceExt;
use uuid::Uuid;

use tenant_gateway::access::{AccessContext, require_tenant_editor, require_tenant_viewer};
use tenant_gateway::auth::AuthenticatedUser;
use tenant_gateway::config::AppConfig;
use tenant_gateway::membership::TenantRole;
use tenant_gateway::pool::TenantConnectionManager;
use tenant_gateway::server::AppState;

fn test_state(profile: &str) -> AppState {
    let config = AppConfig {
        profile: profile.to_string(),
        gateway_tokens: vec!["test-token".to_string()],
        ..Default::default()
    };
    let db = DatabaseConnection::default();
    let pools = Arc::new(TenantConnectionManager::new(
        db.clone(),
        config.tenant_db.clone(),
        config.is_development(),
    ));
    AppState {
        config: Arc::new(config),
        db,
        pools,
    }
}

async fn show_role(access: AccessContext) -> String {
    access.role.to_string()
}

#[tokio::test]
async fn invalid_tenant_uuid_returns_400() {
    let state = test_state("test");
    let app = Router::new()
        .route(
            "/t/{tenant_id}",
            get(show_role).route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_tenant_viewer,
            )),
        )
        .with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/t/not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_identity_returns_401() {
    let state = test_state("test");
    let app = Router::new()
        .route(
            "/t/{tenant_id}",
            get(show_role).route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_tenant_viewer,
            )),
        )
        .with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/t/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upstream_context_skips_re_resolution_and_passes_floor() {
    let state = test_state("test");
    let tenant_id = Uuid::new_v4();

    // A context resolved by an upstream gate is honored without a second
    // membership query (the default DatabaseConnection would fail one).
    let app = Router::new()
        .route(
            "/t/{tenant_id}",
            get(show_role).route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_tenant_viewer,
            )),
        )
        .layer(Extension(AccessContext::new(tenant_id, TenantRole::Editor)))
        .with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/t/{}", tenant_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upstream_context_below_floor_returns_403() {
    let state = test_state("test");
    let tenant_id = Uuid::new_v4();

    let app = Router::new()
        .route(
            "/t/{tenant_id}",
            get(show_role).route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_tenant_editor,
            )),
        )
        .layer(Extension(AccessContext::new(tenant_id, TenantRole::Viewer)))
        .layer(Extension(AuthenticatedUser {
            id: Uuid::new_v4(),
            email: None,
            global_role: None,
        }))
        .with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/t/{}", tenant_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Viewer never satisfies an editor floor.
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn development_profile_attaches_owner_context() {
    let state = test_state("local");
    let app = Router::new()
        .route(
            "/t/{tenant_id}",
            get(show_role).route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_tenant_editor,
            )),
        )
        .with_state(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/t/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"owner");
}

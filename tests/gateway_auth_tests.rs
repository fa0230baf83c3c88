//! Service-level bearer authentication and identity forwarding.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
};
use tower::ServiceExt;
use uuid::Uuid;

use tenant_gateway::auth::{AuthenticatedUser, auth_middleware};
use tenant_gateway::config::AppConfig;

fn test_config() -> Arc<AppConfig> {
    Arc::new(AppConfig {
        gateway_tokens: vec!["test-token-123".to_string()],
        ..Default::default()
    })
}

async fn whoami(request: axum::extract::Request) -> String {
    match request.extensions().get::<AuthenticatedUser>() {
        Some(user) => user.id.to_string(),
        None => "anonymous".to_string(),
    }
}

fn app(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/test", get(whoami))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
}

#[tokio::test]
async fn missing_auth_header_returns_401() {
    let response = app(test_config())
        .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_scheme_returns_401() {
    let response = app(test_config())
        .oneshot(
            Request::builder()
                .uri("/test")
                .header("Authorization", "Basic dGVzdDoxMjM=")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_token_returns_401() {
    let response = app(test_config())
        .oneshot(
            Request::builder()
                .uri("/test")
                .header("Authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_token_without_identity_passes_as_anonymous() {
    let response = app(test_config())
        .oneshot(
            Request::builder()
                .uri("/test")
                .header("Authorization", "Bearer test-token-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"anonymous");
}

#[tokio::test]
async fn forwarded_identity_is_attached() {
    let user_id = Uuid::new_v4();
    let response = app(test_config())
        .oneshot(
            Request::builder()
                .uri("/test")
                .header("Authorization", "Bearer test-token-123")
                .header("X-User-Id", user_id.to_string())
                .header("X-User-Email", "dev@example.com")
                .header("X-User-Role", "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(body, user_id.to_string().as_bytes());
}

#[tokio::test]
async fn malformed_identity_header_returns_400() {
    let response = app(test_config())
        .oneshot(
            Request::builder()
                .uri("/test")
                .header("Authorization", "Bearer test-token-123")
                .header("X-User-Id", "not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn multiple_tokens_supported() {
    let config = Arc::new(AppConfig {
        gateway_tokens: vec![
            "token-one".to_string(),
            "token-two".to_string(),
            "token-three".to_string(),
        ],
        ..Default::default()
    });

    for candidate in ["token-one", "token-two", "token-three"] {
        let response = app(Arc::clone(&config))
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("Authorization", format!("Bearer {}", candidate))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

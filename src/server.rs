//! # Server Configuration
//!
//! Router assembly, shared state and OpenAPI documentation for the gateway.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::access;
use crate::auth;
use crate::config::AppConfig;
use crate::handlers;
use crate::pool::TenantConnectionManager;
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Platform directory pool; never used for tenant data.
    pub db: DatabaseConnection,
    /// Registry of per-tenant pools.
    pub pools: Arc<TenantConnectionManager>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let viewer_gate =
        middleware::from_fn_with_state(state.clone(), access::require_tenant_viewer);
    let editor_gate =
        middleware::from_fn_with_state(state.clone(), access::require_tenant_editor);
    let admin_gate = middleware::from_fn_with_state(state.clone(), access::require_tenant_admin);

    let tenant_routes = Router::new()
        .route("/", get(handlers::tenants::list_tenants))
        .route("/self", post(handlers::tenants::self_provision))
        .route("/projects", post(handlers::tenants::create_project))
        .route(
            "/{tenant_id}",
            delete(handlers::tenants::delete_tenant).route_layer(admin_gate.clone()),
        )
        .route(
            "/{tenant_id}/members",
            get(handlers::members::list_members)
                .post(handlers::members::upsert_member)
                .delete(handlers::members::remove_member)
                .route_layer(admin_gate),
        )
        .route(
            "/{tenant_id}/tables/{table_ref}/data",
            get(handlers::table_data::get_table_data).route_layer(viewer_gate.clone()),
        )
        .route(
            "/{tenant_id}/tables/{table_ref}/data",
            post(handlers::table_data::insert_table_data)
                .put(handlers::table_data::update_table_data)
                .delete(handlers::table_data::delete_table_data)
                .route_layer(editor_gate.clone()),
        )
        .route(
            "/{tenant_id}/tables/{table_ref}/structure",
            get(handlers::table_structure::get_table_structure).route_layer(viewer_gate.clone()),
        )
        .route(
            "/{tenant_id}/tables/{table_ref}/structure",
            put(handlers::table_structure::update_table_structure).route_layer(editor_gate),
        )
        .route(
            "/{tenant_id}/query",
            post(handlers::query::execute_query).route_layer(viewer_gate),
        );

    let api = Router::new()
        .nest("/api/v1/tenants", tenant_routes)
        .route("/api/v1/apps/provision", post(handlers::apps::provision_app_database))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let development = config.is_development();
    let config = Arc::new(config);
    let pools = Arc::new(TenantConnectionManager::new(
        db.clone(),
        config.tenant_db.clone(),
        development,
    ));

    let state = AppState {
        config: Arc::clone(&config),
        db,
        pools: Arc::clone(&pools),
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Gateway listening");

    axum::serve(listener, app).await?;

    // Controlled shutdown: best-effort teardown of every tenant pool.
    pools.clear_cache().await;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::tenants::self_provision,
        crate::handlers::tenants::create_project,
        crate::handlers::tenants::list_tenants,
        crate::handlers::tenants::delete_tenant,
        crate::handlers::members::list_members,
        crate::handlers::members::upsert_member,
        crate::handlers::members::remove_member,
        crate::handlers::table_data::get_table_data,
        crate::handlers::table_data::insert_table_data,
        crate::handlers::table_data::update_table_data,
        crate::handlers::table_data::delete_table_data,
        crate::handlers::table_structure::get_table_structure,
        crate::handlers::table_structure::update_table_structure,
        crate::handlers::query::execute_query,
        crate::handlers::apps::provision_app_database,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::membership::TenantRole,
            crate::membership::DbMode,
        )
    ),
    info(
        title = "Tenant Database Gateway API",
        description = "Multi-tenant database gateway: per-tenant pools, role-gated access, dynamic queries and provisioning",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

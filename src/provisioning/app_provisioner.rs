//! Database provisioning for generated applications.
//!
//! Creates a tenant/membership pair scoped to the requesting user, delegates
//! the actual role/database creation to the orchestrator, then applies the
//! schema extracted from the application's source files. Schema application
//! is best-effort: a partially seeded database is still a usable database, so
//! extraction/DDL failures are reported as warnings on an otherwise
//! successful provisioning response.

use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::TenantDbConfig;
use crate::membership::TenantRole;
use crate::pool::build_connection_url;
use crate::provisioning::{
    ProvisionError, ProvisionedDatabase, ProvisioningOrchestrator,
};
use crate::repositories::{CreateTenantParams, MembershipRepository, TenantRepository};
use crate::schema::{self, SchemaProvenance, SourceFile};

/// Inputs for provisioning one generated application.
#[derive(Debug, Clone)]
pub struct ProvisionAppOptions {
    pub user_id: Uuid,
    pub app_id: String,
    pub app_name: String,
    pub framework: String,
    pub app_files: Vec<SourceFile>,
}

/// Lifecycle state reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AppDatabaseStatus {
    Provisioned,
    Exists,
}

/// Everything the generated app needs to reach its database.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AppDatabase {
    pub tenant_id: Uuid,
    pub database: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connection_string: String,
    pub status: AppDatabaseStatus,
    pub tables_created: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_sql: Option<String>,
    /// Set when the schema was inferred rather than declared, so callers can
    /// warn users the schema is a guess.
    pub schema_inferred: bool,
    /// Non-fatal schema application failure, when one occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_warning: Option<String>,
}

/// Provisioner for generated applications.
pub struct AppDatabaseProvisioner<'a> {
    db: &'a DatabaseConnection,
    config: &'a TenantDbConfig,
}

impl<'a> AppDatabaseProvisioner<'a> {
    pub fn new(db: &'a DatabaseConnection, config: &'a TenantDbConfig) -> Self {
        Self { db, config }
    }

    /// Provision (or look up) the database backing one generated app.
    pub async fn provision_database(
        &self,
        opts: ProvisionAppOptions,
    ) -> Result<AppDatabase, ProvisionError> {
        let subdomain = derive_app_subdomain(&opts.app_name, &opts.app_id);
        let tenants = TenantRepository::new(self.db);

        let existing = tenants
            .find_by_subdomain(&subdomain)
            .await
            .map_err(ProvisionError::Directory)?;

        // Complete connection info means the app already has its database.
        if let Some(tenant) = &existing {
            let info = crate::pool::ConnectionInfo::new(tenant.connection_info.clone());
            if info.is_complete() {
                tracing::info!(app_id = %opts.app_id, tenant_id = %tenant.id, "Database already exists for app");
                let host = info.host().unwrap_or_else(|| self.config.host.clone());
                let port = info.port().unwrap_or(self.config.port);
                let database = info.database().unwrap_or_default();
                let username = info.username().unwrap_or_default();
                let password = info.password().unwrap_or_default();
                let connection_string =
                    build_connection_url(&host, port, &database, &username, &password)
                        .map_err(|e| ProvisionError::Config(e.to_string()))?;
                return Ok(AppDatabase {
                    tenant_id: tenant.id,
                    database,
                    host,
                    port,
                    username,
                    password,
                    connection_string,
                    status: AppDatabaseStatus::Exists,
                    tables_created: 0,
                    schema_sql: None,
                    schema_inferred: false,
                    schema_warning: None,
                });
            }
        }

        let tenant_id = match existing {
            Some(tenant) => tenant.id,
            None => {
                let tenant_id = Uuid::new_v4();
                tenants
                    .create_tenant(CreateTenantParams {
                        id: tenant_id,
                        name: opts.app_name.clone(),
                        subdomain: Some(subdomain.clone()),
                        plan_type: Some("free".to_string()),
                        region: None,
                    })
                    .await
                    .map_err(ProvisionError::Directory)?;

                MembershipRepository::new(self.db)
                    .upsert_member(tenant_id, opts.user_id, TenantRole::Admin)
                    .await
                    .map_err(ProvisionError::Directory)?;

                tracing::info!(
                    tenant_id = %tenant_id,
                    user_id = %opts.user_id,
                    app_id = %opts.app_id,
                    "Created tenant record for generated app"
                );
                tenant_id
            }
        };

        let orchestrator = ProvisioningOrchestrator::new(self.db, self.config);
        let outcome = orchestrator
            .ensure_tenant_database_provisioned(tenant_id, None)
            .await?;

        // The orchestrator withholds the password on the idempotent path;
        // recover it from the directory for the connection string.
        let password = match outcome.password.clone() {
            Some(password) => password,
            None => tenants
                .connection_info(tenant_id)
                .await
                .map_err(ProvisionError::Directory)?
                .and_then(|info| info.password())
                .unwrap_or_default(),
        };

        let mut tables_created = 0u32;
        let mut schema_sql = None;
        let mut schema_inferred = false;
        let mut schema_warning = None;

        if !opts.app_files.is_empty() {
            let extracted = schema::extract_schema(&opts.app_files);
            schema_inferred = extracted.provenance == SchemaProvenance::Inferred;
            let sql = schema::generate_sql(&extracted);

            tracing::info!(
                tenant_id = %tenant_id,
                tables = extracted.tables.len(),
                inferred = schema_inferred,
                "Applying extracted schema"
            );

            match self.apply_schema(&outcome.db, &password, &sql).await {
                Ok(()) => {
                    tables_created = extracted.tables.len() as u32;
                    if tables_created > 0 {
                        schema_sql = Some(sql);
                    }
                }
                Err(e) => {
                    // Schema failure never invalidates the provisioned
                    // database; both outcomes are reported independently.
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        error = %e,
                        "Schema application failed (non-fatal)"
                    );
                    schema_warning = Some(e.to_string());
                }
            }
        }

        let connection_string = build_connection_url(
            &outcome.db.host,
            outcome.db.port,
            &outcome.db.database,
            &outcome.db.username,
            &password,
        )
        .map_err(|e| ProvisionError::Config(e.to_string()))?;

        Ok(AppDatabase {
            tenant_id,
            database: outcome.db.database.clone(),
            host: outcome.db.host.clone(),
            port: outcome.db.port,
            username: outcome.db.username.clone(),
            password,
            connection_string,
            status: if outcome.provisioned {
                AppDatabaseStatus::Provisioned
            } else {
                AppDatabaseStatus::Exists
            },
            tables_created,
            schema_sql,
            schema_inferred,
            schema_warning,
        })
    }

    /// Run generated DDL against the new database over a short-lived,
    /// unpooled connection that is always closed afterwards.
    async fn apply_schema(
        &self,
        db: &ProvisionedDatabase,
        password: &str,
        sql: &str,
    ) -> Result<(), ProvisionError> {
        let url = build_connection_url(&db.host, db.port, &db.database, &db.username, password)
            .map_err(|e| ProvisionError::Config(e.to_string()))?;

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(1)
            .acquire_timeout(Duration::from_millis(self.config.statement_timeout_ms))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await.map_err(ProvisionError::Admin)?;

        let result = conn.execute_unprepared(sql).await;

        // Closed regardless of outcome; close errors never mask the result.
        if let Err(e) = conn.close_by_ref().await {
            tracing::warn!(error = %e, "Error closing schema connection");
        }

        result.map_err(ProvisionError::Admin)?;
        Ok(())
    }
}

/// Deterministic subdomain handle for a generated app: lowercased name slug
/// plus the first segment of the app id for uniqueness. Used to make repeated
/// provisioning calls for the same app converge on one tenant.
pub fn derive_app_subdomain(app_name: &str, app_id: &str) -> String {
    let slug: String = app_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let slug: String = {
        // Collapse runs of dashes left by consecutive non-alphanumerics.
        let mut out = String::with_capacity(slug.len());
        let mut prev_dash = false;
        for c in slug.chars() {
            if c == '-' {
                if !prev_dash {
                    out.push(c);
                }
                prev_dash = true;
            } else {
                out.push(c);
                prev_dash = false;
            }
        }
        out.chars().take(40).collect()
    };

    let short_id = app_id.split('-').next().unwrap_or(app_id);
    format!("app-{}-{}", slug, short_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_is_deterministic() {
        let a = derive_app_subdomain("My Cool App", "abc123-def");
        let b = derive_app_subdomain("My Cool App", "abc123-def");
        assert_eq!(a, b);
        assert_eq!(a, "app-my-cool-app-abc123");
    }

    #[test]
    fn subdomain_collapses_special_characters() {
        let sub = derive_app_subdomain("Shop!  & Pay", "f00d-beef");
        assert_eq!(sub, "app-shop-pay-f00d");
    }

    #[test]
    fn subdomain_truncates_long_names() {
        let long_name = "a".repeat(80);
        let sub = derive_app_subdomain(&long_name, "xyz");
        // "app-" + 40-char slug + "-xyz"
        assert_eq!(sub.len(), 4 + 40 + 4);
    }

    #[test]
    fn subdomain_keeps_full_id_without_dashes() {
        let sub = derive_app_subdomain("x", "plainid");
        assert_eq!(sub, "app-x-plainid");
    }
}

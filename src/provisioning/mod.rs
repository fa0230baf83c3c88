//! # Tenant Database Provisioning
//!
//! Creates the dedicated login role and database for a tenant and records the
//! connection metadata in the directory. Provisioning is idempotent: a tenant
//! whose directory row already carries a complete connection descriptor is a
//! no-op, reported as "already exists" without touching the administrative
//! connection at all.
//!
//! Concurrent attempts collapse into one winner via a cross-process advisory
//! lock keyed by the tenant id, scoped to the directory transaction; the
//! external role/database creation cannot be rolled back by that transaction,
//! which is exactly why the lock must cover it.

pub mod app_provisioner;

pub use app_provisioner::{AppDatabase, AppDatabaseProvisioner, ProvisionAppOptions};

use std::sync::LazyLock;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use regex::Regex;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, JsonValue,
    Statement, TransactionTrait,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::TenantDbConfig;
use crate::error::ApiError;
use crate::pool::{ConnectionInfo, build_connection_url};
use crate::repositories::TenantRepository;

/// Errors surfaced by the provisioning workflow.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Tenant {0} not found in directory")]
    TenantNotFound(Uuid),
    #[error(
        "Provisioning password not configured; set GATEWAY_PROVISION_PASSWORD(_FILE) or GATEWAY_POSTGRES_PASSWORD(_FILE)"
    )]
    MissingProvisionPassword,
    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("Directory operation failed: {0}")]
    Directory(#[source] DbErr),
    #[error("Administrative connection failed: {0}")]
    Admin(#[source] DbErr),
    #[error("Invalid connection configuration: {0}")]
    Config(String),
}

impl From<ProvisionError> for ApiError {
    fn from(error: ProvisionError) -> Self {
        match &error {
            ProvisionError::TenantNotFound(tenant_id) => {
                crate::error::not_found(&format!("Tenant {} not found", tenant_id))
            }
            _ => {
                tracing::error!(error = %error, "Provisioning failed");
                crate::error::downstream_failure("Database provisioning failed")
            }
        }
    }
}

/// Connection descriptor returned to callers; never includes the password.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProvisionedDatabase {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
}

/// Result of one provisioning attempt.
#[derive(Debug)]
pub struct ProvisionOutcome {
    /// True only when resources were created (or a password rotated) now.
    pub provisioned: bool,
    pub db: ProvisionedDatabase,
    /// Present only on first creation; an existing password is never
    /// re-disclosed on subsequent calls.
    pub password: Option<String>,
}

/// Deterministic database name for a tenant.
pub fn tenant_db_name(tenant_id: Uuid) -> String {
    format!("tenant_{}", tenant_id.to_string().replace('-', "_"))
}

/// Deterministic owner-role name for a tenant.
pub fn tenant_owner_role(tenant_id: Uuid) -> String {
    format!("{}_owner", tenant_db_name(tenant_id))
}

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("identifier regex"));

/// Quote a role/database identifier for DDL. The names are generated by this
/// module, so the shape check is strict rather than permissive.
pub fn safe_ident(raw: &str) -> Result<String, ProvisionError> {
    if !IDENT_RE.is_match(raw) {
        return Err(ProvisionError::InvalidIdentifier(raw.to_string()));
    }
    Ok(format!("\"{}\"", raw.replace('"', "\"\"")))
}

/// Quote a string literal for DDL positions where binding is unavailable.
fn quote_literal(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

/// 32 random bytes, url-safe base64: strong enough for a login password and
/// safe to embed in connection URLs.
pub fn random_password() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Orchestrates role/database creation against the administrative connection
/// and connection-metadata persistence in the directory.
pub struct ProvisioningOrchestrator<'a> {
    db: &'a DatabaseConnection,
    config: &'a TenantDbConfig,
}

impl<'a> ProvisioningOrchestrator<'a> {
    pub fn new(db: &'a DatabaseConnection, config: &'a TenantDbConfig) -> Self {
        Self { db, config }
    }

    /// Ensure the tenant has a dedicated database, creating role + database
    /// on first call and reporting `provisioned: false` afterwards.
    pub async fn ensure_tenant_database_provisioned(
        &self,
        tenant_id: Uuid,
        desired_password: Option<&str>,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let txn = self.db.begin().await.map_err(ProvisionError::Directory)?;

        // Cross-process exclusion: concurrent retries for the same tenant
        // serialize here and the loser sees the winner's connection_info.
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT pg_advisory_xact_lock(hashtext($1))",
            [tenant_id.to_string().into()],
        ))
        .await
        .map_err(ProvisionError::Directory)?;

        let row = txn
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT connection_info FROM tenants WHERE id = $1",
                [tenant_id.into()],
            ))
            .await
            .map_err(ProvisionError::Directory)?;

        let Some(row) = row else {
            return Err(ProvisionError::TenantNotFound(tenant_id));
        };

        let raw: JsonValue = row
            .try_get("", "connection_info")
            .map_err(ProvisionError::Directory)?;
        let info = ConnectionInfo::new(raw);

        if info.is_complete() {
            txn.commit().await.map_err(ProvisionError::Directory)?;
            return Ok(ProvisionOutcome {
                provisioned: false,
                db: ProvisionedDatabase {
                    host: info.host().unwrap_or_else(|| self.config.host.clone()),
                    port: info.port().unwrap_or(self.config.port),
                    database: info.database().unwrap_or_default(),
                    username: info.username().unwrap_or_default(),
                },
                password: None,
            });
        }

        let database = tenant_db_name(tenant_id);
        let role = tenant_owner_role(tenant_id);
        let desired = desired_password.map(str::trim).filter(|p| !p.is_empty());
        let password = desired
            .map(str::to_string)
            .unwrap_or_else(random_password);

        let admin = self.connect_admin().await?;
        let created = self
            .create_role_and_database(&admin, &role, &database, &password, desired.is_some())
            .await;
        if let Err(e) = admin.close_by_ref().await {
            tracing::warn!(error = %e, "Error closing administrative connection");
        }
        created?;

        let connection_info = json!({
            "host": self.config.host,
            "port": self.config.port,
            "database": database,
            "username": role,
            "password": password,
        });
        TenantRepository::set_connection_info(&txn, tenant_id, &connection_info)
            .await
            .map_err(ProvisionError::Directory)?;

        txn.commit().await.map_err(ProvisionError::Directory)?;

        tracing::info!(
            tenant_id = %tenant_id,
            database = %database,
            role = %role,
            "Provisioned tenant database"
        );

        Ok(ProvisionOutcome {
            provisioned: true,
            db: ProvisionedDatabase {
                host: self.config.host.clone(),
                port: self.config.port,
                database,
                username: role,
            },
            password: Some(password),
        })
    }

    /// Connect to the engine's maintenance database as the provisioning
    /// principal. This connection is never reused for tenant data queries.
    async fn connect_admin(&self) -> Result<DatabaseConnection, ProvisionError> {
        let provision_password = self
            .config
            .provision_password
            .clone()
            .ok_or(ProvisionError::MissingProvisionPassword)?;

        let url = build_connection_url(
            &self.config.host,
            self.config.port,
            &self.config.maintenance_database,
            &self.config.provision_user,
            &provision_password,
        )
        .map_err(|e| ProvisionError::Config(e.to_string()))?;

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(2)
            .acquire_timeout(Duration::from_millis(self.config.statement_timeout_ms))
            .sqlx_logging(false);

        Database::connect(opt).await.map_err(ProvisionError::Admin)
    }

    async fn create_role_and_database(
        &self,
        admin: &DatabaseConnection,
        role: &str,
        database: &str,
        password: &str,
        rotate_password: bool,
    ) -> Result<(), ProvisionError> {
        let role_exists = admin
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT 1 AS present FROM pg_roles WHERE rolname = $1 LIMIT 1",
                [role.into()],
            ))
            .await
            .map_err(ProvisionError::Admin)?
            .is_some();

        if !role_exists {
            admin
                .execute_unprepared(&format!(
                    "CREATE ROLE {} WITH LOGIN PASSWORD {}",
                    safe_ident(role)?,
                    quote_literal(password)
                ))
                .await
                .map_err(ProvisionError::Admin)?;
        } else if rotate_password {
            // Only rotate when the caller explicitly supplied a password.
            admin
                .execute_unprepared(&format!(
                    "ALTER ROLE {} WITH PASSWORD {}",
                    safe_ident(role)?,
                    quote_literal(password)
                ))
                .await
                .map_err(ProvisionError::Admin)?;
        }

        let db_exists = admin
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT 1 AS present FROM pg_database WHERE datname = $1 LIMIT 1",
                [database.into()],
            ))
            .await
            .map_err(ProvisionError::Admin)?
            .is_some();

        if !db_exists {
            admin
                .execute_unprepared(&format!(
                    "CREATE DATABASE {} OWNER {}",
                    safe_ident(database)?,
                    safe_ident(role)?
                ))
                .await
                .map_err(ProvisionError::Admin)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_replaces_dashes() {
        let id: Uuid = "4f5c1a8e-9b52-4a7e-8a6e-0c4f4a4b2d11".parse().unwrap();
        assert_eq!(
            tenant_db_name(id),
            "tenant_4f5c1a8e_9b52_4a7e_8a6e_0c4f4a4b2d11"
        );
    }

    #[test]
    fn owner_role_derives_from_database_name() {
        let id: Uuid = "4f5c1a8e-9b52-4a7e-8a6e-0c4f4a4b2d11".parse().unwrap();
        assert_eq!(
            tenant_owner_role(id),
            "tenant_4f5c1a8e_9b52_4a7e_8a6e_0c4f4a4b2d11_owner"
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(tenant_db_name(id), tenant_db_name(id));
        assert_eq!(tenant_owner_role(id), tenant_owner_role(id));
    }

    #[test]
    fn safe_ident_accepts_generated_names() {
        let id = Uuid::new_v4();
        assert!(safe_ident(&tenant_db_name(id)).is_ok());
        assert!(safe_ident(&tenant_owner_role(id)).is_ok());
    }

    #[test]
    fn safe_ident_rejects_injection_shapes() {
        assert!(safe_ident("tenant; DROP DATABASE x").is_err());
        assert!(safe_ident("1starts_with_digit").is_err());
        assert!(safe_ident("").is_err());
        assert!(safe_ident("has-dash").is_err());
    }

    #[test]
    fn quote_literal_escapes_single_quotes() {
        assert_eq!(quote_literal("pa'ss"), "'pa''ss'");
        assert_eq!(quote_literal("plain"), "'plain'");
    }

    #[test]
    fn random_passwords_are_long_and_distinct() {
        let a = random_password();
        let b = random_password();
        assert_ne!(a, b);
        // 32 bytes in url-safe base64 without padding.
        assert_eq!(a.len(), 43);
        assert!(!a.contains('='));
        assert!(!a.contains('+'));
        assert!(!a.contains('/'));
    }
}

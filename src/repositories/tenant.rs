//! # Tenant Directory Repository
//!
//! CRUD operations for the tenant directory. Deletion is soft and one-way:
//! rows move from `active` to `deleted` status, and the underlying database
//! plus its login role are left for out-of-band operational cleanup.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    FromQueryResult, JsonValue, Set, Statement,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::tenant::{
    ActiveModel as TenantActiveModel, Entity as Tenant, Model as TenantModel,
};
use crate::pool::ConnectionInfo;

/// Request data for creating a new tenant
#[derive(Debug, Clone)]
pub struct CreateTenantParams {
    pub id: Uuid,
    pub name: String,
    pub subdomain: Option<String>,
    pub plan_type: Option<String>,
    pub region: Option<String>,
}

/// A tenant row joined with the requesting user's membership role.
#[derive(Debug, Clone, FromQueryResult, Serialize, ToSchema)]
pub struct TenantWithRole {
    pub id: Uuid,
    pub name: String,
    pub subdomain: Option<String>,
    pub plan_type: Option<String>,
    pub status: String,
    pub role: String,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
}

/// Repository for tenant directory operations
pub struct TenantRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new tenant with an empty connection descriptor.
    pub async fn create_tenant(&self, params: CreateTenantParams) -> Result<TenantModel, DbErr> {
        let now = Utc::now();

        let tenant = TenantActiveModel {
            id: Set(params.id),
            name: Set(params.name),
            subdomain: Set(params.subdomain),
            plan_type: Set(params.plan_type),
            region: Set(params.region),
            status: Set("active".to_string()),
            connection_info: Set(JsonValue::Object(Default::default())),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        tenant.insert(self.db).await
    }

    /// Get tenant by ID
    pub async fn get_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<TenantModel>, DbErr> {
        Tenant::find_by_id(tenant_id).one(self.db).await
    }

    /// Find a tenant by its subdomain handle.
    pub async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<TenantModel>, DbErr> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT * FROM tenants WHERE subdomain = $1 LIMIT 1",
            [subdomain.into()],
        );
        TenantModel::find_by_statement(stmt).one(self.db).await
    }

    /// Read the connection descriptor for a tenant.
    pub async fn connection_info(&self, tenant_id: Uuid) -> Result<Option<ConnectionInfo>, DbErr> {
        Ok(self
            .get_tenant_by_id(tenant_id)
            .await?
            .map(|t| ConnectionInfo::new(t.connection_info)))
    }

    /// Persist the connection descriptor produced by provisioning.
    pub async fn set_connection_info<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        info: &JsonValue,
    ) -> Result<(), DbErr> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE tenants SET connection_info = $1::jsonb, updated_at = NOW() WHERE id = $2",
            [info.clone().into(), tenant_id.into()],
        );
        conn.execute(stmt).await?;
        Ok(())
    }

    /// Tenants the user is a member of, newest first.
    pub async fn list_tenants_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TenantWithRole>, DbErr> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT t.id, t.name, t.subdomain, t.plan_type, t.status, tm.role, t.created_at
            FROM tenant_members tm
            JOIN tenants t ON t.id = tm.tenant_id
            WHERE tm.user_id = $1
            ORDER BY t.created_at DESC
            "#,
            [user_id.into()],
        );
        TenantWithRole::find_by_statement(stmt).all(self.db).await
    }

    /// The user's earliest tenant, if any (the "self" project).
    pub async fn earliest_tenant_for_user<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
    ) -> Result<Option<TenantWithRole>, DbErr> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT t.id, t.name, t.subdomain, t.plan_type, t.status, tm.role, t.created_at
            FROM tenant_members tm
            JOIN tenants t ON t.id = tm.tenant_id
            WHERE tm.user_id = $1
            ORDER BY t.created_at ASC
            LIMIT 1
            "#,
            [user_id.into()],
        );
        TenantWithRole::find_by_statement(stmt).one(conn).await
    }

    /// Whether the user belongs to any tenant on a paid plan.
    pub async fn has_paid_tenant(&self, user_id: Uuid) -> Result<bool, DbErr> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT 1 AS present
            FROM tenant_members tm
            JOIN tenants t ON t.id = tm.tenant_id
            WHERE tm.user_id = $1
              AND COALESCE(t.plan_type, 'free') <> 'free'
              AND t.status <> 'deleted'
            LIMIT 1
            "#,
            [user_id.into()],
        );
        Ok(self.db.query_one(stmt).await?.is_some())
    }

    /// One-way soft delete: marks the directory row only. Returns false when
    /// the tenant does not exist or was already deleted.
    pub async fn mark_deleted(&self, tenant_id: Uuid) -> Result<bool, DbErr> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE tenants SET status = 'deleted', updated_at = NOW() \
             WHERE id = $1 AND status <> 'deleted'",
            [tenant_id.into()],
        );
        let result = self.db.execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Validate tenant name according to directory rules.
    pub fn validate_tenant_name(name: &str) -> Result<(), String> {
        if name.trim().is_empty() {
            return Err("Tenant name cannot be empty".to_string());
        }

        if name.len() > 255 {
            return Err("Tenant name cannot exceed 255 characters".to_string());
        }

        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '_')
        {
            return Err(
                "Tenant name can only contain letters, numbers, spaces, hyphens, and underscores"
                    .to_string(),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation_accepts_reasonable_names() {
        assert!(TenantRepository::validate_tenant_name("Acme Corp").is_ok());
        assert!(TenantRepository::validate_tenant_name("my-project_2").is_ok());
    }

    #[test]
    fn name_validation_rejects_empty_and_oversized() {
        assert!(TenantRepository::validate_tenant_name("").is_err());
        assert!(TenantRepository::validate_tenant_name("   ").is_err());
        assert!(TenantRepository::validate_tenant_name(&"a".repeat(256)).is_err());
    }

    #[test]
    fn name_validation_rejects_special_characters() {
        assert!(TenantRepository::validate_tenant_name("acme@corp").is_err());
        assert!(TenantRepository::validate_tenant_name("drop;table").is_err());
    }
}

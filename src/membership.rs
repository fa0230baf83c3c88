//! # Tenant Roles and Membership Resolution
//!
//! Roles form an ordered set (`viewer < editor < admin < owner`); every
//! "at least" check goes through [`is_role_at_least`], never string equality.
//! Role resolution consults the platform membership table, with an explicit
//! global-operator bypass and a legacy-table fallback that only triggers when
//! the primary relation is missing entirely.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::is_undefined_table;

/// Ordered permission level a user holds within one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TenantRole {
    Viewer,
    Editor,
    Admin,
    Owner,
}

impl TenantRole {
    fn order(self) -> u8 {
        match self {
            TenantRole::Viewer => 1,
            TenantRole::Editor => 2,
            TenantRole::Admin => 3,
            TenantRole::Owner => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TenantRole::Viewer => "viewer",
            TenantRole::Editor => "editor",
            TenantRole::Admin => "admin",
            TenantRole::Owner => "owner",
        }
    }

    /// Database access mode this role maps to: viewers read only, everyone
    /// else reads and writes.
    pub fn db_mode(self) -> DbMode {
        match self {
            TenantRole::Viewer => DbMode::ReadOnly,
            _ => DbMode::ReadWrite,
        }
    }
}

impl std::fmt::Display for TenantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived read-only/read-write capability used to select which database
/// principal a query runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DbMode {
    ReadOnly,
    ReadWrite,
}

impl DbMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DbMode::ReadOnly => "ro",
            DbMode::ReadWrite => "rw",
        }
    }
}

/// Ordinal "at least" comparison: `admin` satisfies an `editor` floor,
/// `viewer` never satisfies `editor`.
pub fn is_role_at_least(actual: TenantRole, required: TenantRole) -> bool {
    actual.order() >= required.order()
}

/// Map free-form role text from the membership store onto the ordered set.
/// Unknown values degrade to viewer rather than erroring.
pub fn normalize_role(value: &str) -> TenantRole {
    match value.trim().to_lowercase().as_str() {
        "owner" => TenantRole::Owner,
        "admin" => TenantRole::Admin,
        "editor" | "write" | "rw" => TenantRole::Editor,
        _ => TenantRole::Viewer,
    }
}

/// Operator bypass: platform operators (global role containing `admin`) get
/// the highest tenant role everywhere. Kept separate from per-tenant lookup
/// so the bypass stays independently testable and auditable.
pub fn global_operator_role(user: &AuthenticatedUser) -> Option<TenantRole> {
    let global = user.global_role.as_deref().unwrap_or("").to_lowercase();
    if global.contains("admin") {
        Some(TenantRole::Owner)
    } else {
        None
    }
}

/// Legacy/alternate membership tables probed when the primary relation has
/// not been migrated yet. Order matters: first hit wins.
const FALLBACK_MEMBERSHIP_TABLES: &[&str] = &[
    "tenant_members",
    "tenant_users",
    "user_tenants",
    "project_members",
];

/// Resolves a user's role within a tenant against the platform directory.
pub struct TenantMembershipService<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantMembershipService<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Resolve a user's role in a tenant.
    ///
    /// Order of precedence:
    /// 1) global-operator bypass (when enabled),
    /// 2) the `tenant_members` table,
    /// 3) legacy association tables, only if the primary relation is missing.
    ///
    /// Returns `None` when the user simply is not a member; callers render
    /// that as 403, not 500.
    pub async fn resolve_role(
        &self,
        tenant_id: Uuid,
        user: &AuthenticatedUser,
        allow_operator_bypass: bool,
    ) -> Result<Option<TenantRole>, sea_orm::DbErr> {
        if allow_operator_bypass
            && let Some(role) = global_operator_role(user)
        {
            tracing::info!(
                tenant_id = %tenant_id,
                user_id = %user.id,
                "Global operator bypass granted tenant access"
            );
            return Ok(Some(role));
        }

        match self.lookup_membership(tenant_id, user.id).await {
            Ok(found) => return Ok(found),
            Err(e) if is_undefined_table(&e) => {
                // First deploy: the membership table may not exist yet.
                tracing::warn!(
                    tenant_id = %tenant_id,
                    "tenant_members relation missing, probing legacy tables"
                );
            }
            // Non-"table missing" errors must surface to help ops.
            Err(e) => return Err(e),
        }

        for table in FALLBACK_MEMBERSHIP_TABLES {
            match self.lookup_in_table(table, tenant_id, user.id).await {
                Ok(Some(role)) => return Ok(Some(role)),
                Ok(None) => continue,
                Err(_) => continue,
            }
        }

        Ok(None)
    }

    /// Primary membership lookup against `tenant_members`.
    async fn lookup_membership(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TenantRole>, sea_orm::DbErr> {
        self.lookup_in_table("tenant_members", tenant_id, user_id)
            .await
    }

    async fn lookup_in_table(
        &self,
        table: &str,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TenantRole>, sea_orm::DbErr> {
        // Table names come from a compile-time list, never from user input.
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                "SELECT role FROM {} WHERE tenant_id = $1 AND user_id = $2 LIMIT 1",
                table
            ),
            [tenant_id.into(), user_id.into()],
        );

        let row = self.db.query_one(stmt).await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let role: String = row.try_get("", "role")?;
        Ok(Some(normalize_role(&role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(global_role: Option<&str>) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            email: Some("user@example.com".to_string()),
            global_role: global_role.map(|r| r.to_string()),
        }
    }

    #[test]
    fn role_ordering_is_total() {
        assert!(is_role_at_least(TenantRole::Owner, TenantRole::Admin));
        assert!(is_role_at_least(TenantRole::Admin, TenantRole::Editor));
        assert!(is_role_at_least(TenantRole::Editor, TenantRole::Viewer));
        assert!(is_role_at_least(TenantRole::Viewer, TenantRole::Viewer));

        assert!(!is_role_at_least(TenantRole::Viewer, TenantRole::Editor));
        assert!(!is_role_at_least(TenantRole::Editor, TenantRole::Admin));
        assert!(!is_role_at_least(TenantRole::Admin, TenantRole::Owner));
    }

    #[test]
    fn admin_satisfies_editor_floor() {
        // Ordinal comparison, not equality: a stricter role passes a looser floor.
        assert!(is_role_at_least(TenantRole::Admin, TenantRole::Editor));
    }

    #[test]
    fn normalize_role_handles_aliases() {
        assert_eq!(normalize_role("owner"), TenantRole::Owner);
        assert_eq!(normalize_role("ADMIN "), TenantRole::Admin);
        assert_eq!(normalize_role("editor"), TenantRole::Editor);
        assert_eq!(normalize_role("write"), TenantRole::Editor);
        assert_eq!(normalize_role("rw"), TenantRole::Editor);
        assert_eq!(normalize_role("viewer"), TenantRole::Viewer);
        assert_eq!(normalize_role("banana"), TenantRole::Viewer);
        assert_eq!(normalize_role(""), TenantRole::Viewer);
    }

    #[test]
    fn db_mode_derivation() {
        assert_eq!(TenantRole::Viewer.db_mode(), DbMode::ReadOnly);
        assert_eq!(TenantRole::Editor.db_mode(), DbMode::ReadWrite);
        assert_eq!(TenantRole::Admin.db_mode(), DbMode::ReadWrite);
        assert_eq!(TenantRole::Owner.db_mode(), DbMode::ReadWrite);
    }

    #[test]
    fn operator_bypass_requires_admin_global_role() {
        assert_eq!(
            global_operator_role(&user(Some("admin"))),
            Some(TenantRole::Owner)
        );
        assert_eq!(
            global_operator_role(&user(Some("super_admin"))),
            Some(TenantRole::Owner)
        );
        assert_eq!(global_operator_role(&user(Some("editor"))), None);
        assert_eq!(global_operator_role(&user(None)), None);
    }
}

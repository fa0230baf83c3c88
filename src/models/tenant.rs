//! Tenant directory entity.
//!
//! Each row represents one isolated customer/project. `connection_info` holds
//! the credentials for the tenant's dedicated database as a JSON blob; an
//! empty object means the tenant has not been provisioned yet.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as Json;

/// Tenant directory row: the unit of database isolation (1:1 with a logical
/// database, never shared).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    /// Unique identifier for the tenant (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name for the tenant
    pub name: String,

    /// URL-safe handle, unique in practice (used for generated-app lookup)
    pub subdomain: Option<String>,

    /// Billing plan identifier; `free` gates additional project creation
    pub plan_type: Option<String>,

    /// Deployment region hint
    pub region: Option<String>,

    /// Lifecycle status; deletes are soft and one-way (`active` -> `deleted`)
    pub status: String,

    /// Connection descriptor for the tenant's isolated database
    #[sea_orm(column_type = "JsonBinary")]
    pub connection_info: Json,

    /// Timestamp when the tenant was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last directory update
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

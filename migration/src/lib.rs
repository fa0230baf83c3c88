//! Database migrations for the tenant gateway platform directory.
//!
//! These migrations only manage the platform's own control tables (the tenant
//! directory and membership records). Tenant databases are created at runtime
//! by the provisioning workflow, never by migrations.

pub use sea_orm_migration::prelude::*;

mod m2025_01_10_000001_create_tenants;
mod m2025_01_10_000002_create_tenant_members;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_10_000001_create_tenants::Migration),
            Box::new(m2025_01_10_000002_create_tenant_members::Migration),
        ]
    }
}

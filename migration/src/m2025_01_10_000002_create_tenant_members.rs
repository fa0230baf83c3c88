//! Migration to create the tenant membership table.
//!
//! Uniqueness on (tenant_id, user_id) is the invariant that makes role
//! upserts well defined.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TenantMembers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TenantMembers::TenantId).uuid().not_null())
                    .col(ColumnDef::new(TenantMembers::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(TenantMembers::Role)
                            .text()
                            .not_null()
                            .default("viewer"),
                    )
                    .col(
                        ColumnDef::new(TenantMembers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(TenantMembers::TenantId)
                            .col(TenantMembers::UserId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("tenant_members_user_idx")
                    .table(TenantMembers::Table)
                    .col(TenantMembers::UserId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TenantMembers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TenantMembers {
    Table,
    TenantId,
    UserId,
    Role,
    CreatedAt,
}

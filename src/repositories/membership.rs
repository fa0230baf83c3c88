//! # Membership Repository
//!
//! Invite, role-change and revocation operations on tenant memberships.
//! Role changes are upserts keyed on (tenant_id, user_id).

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Set,
};
use uuid::Uuid;

use crate::membership::TenantRole;
use crate::models::tenant_member::{
    ActiveModel as MemberActiveModel, Column as MemberColumn, Entity as TenantMember,
    Model as MemberModel,
};

/// Repository for tenant membership records.
pub struct MembershipRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> MembershipRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or update a membership (invite or role change).
    pub async fn upsert_member(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role: TenantRole,
    ) -> Result<(), DbErr> {
        Self::upsert_member_on(self.db, tenant_id, user_id, role).await
    }

    /// Transaction-friendly variant of [`Self::upsert_member`].
    pub async fn upsert_member_on<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        user_id: Uuid,
        role: TenantRole,
    ) -> Result<(), DbErr> {
        let member = MemberActiveModel {
            tenant_id: Set(tenant_id),
            user_id: Set(user_id),
            role: Set(role.as_str().to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };

        TenantMember::insert(member)
            .on_conflict(
                OnConflict::columns([MemberColumn::TenantId, MemberColumn::UserId])
                    .update_column(MemberColumn::Role)
                    .to_owned(),
            )
            .exec(conn)
            .await?;

        Ok(())
    }

    /// Revoke a membership. Returns false when no membership existed.
    pub async fn remove_member(&self, tenant_id: Uuid, user_id: Uuid) -> Result<bool, DbErr> {
        let result = TenantMember::delete_by_id((tenant_id, user_id))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// All memberships of a tenant, oldest first.
    pub async fn list_members(&self, tenant_id: Uuid) -> Result<Vec<MemberModel>, DbErr> {
        use sea_orm::{ColumnTrait, QueryFilter, QueryOrder};

        TenantMember::find()
            .filter(MemberColumn::TenantId.eq(tenant_id))
            .order_by_asc(MemberColumn::CreatedAt)
            .all(self.db)
            .await
    }
}

//! # Repository Layer
//!
//! Repositories encapsulate SeaORM operations against the platform directory
//! (tenants and memberships), providing a clean API for handlers and the
//! provisioning workflow.

pub mod membership;
pub mod tenant;

pub use membership::MembershipRepository;
pub use tenant::{CreateTenantParams, TenantRepository, TenantWithRole};

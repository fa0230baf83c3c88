//! # Data Models
//!
//! SeaORM entities for the platform directory plus shared response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod tenant;
pub mod tenant_member;

pub use tenant::Entity as Tenant;
pub use tenant_member::Entity as TenantMember;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "tenant-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

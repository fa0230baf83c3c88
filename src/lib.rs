//! # Tenant Database Gateway Library
//!
//! Core functionality for the multi-tenant database gateway: per-tenant
//! connection pooling, role resolution, access gating, dynamic query
//! building, schema extraction and tenant provisioning.

pub mod access;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod membership;
pub mod models;
pub mod pool;
pub mod provisioning;
pub mod query;
pub mod repositories;
pub mod schema;
pub mod secrets;
pub mod server;
pub mod telemetry;
pub use migration;

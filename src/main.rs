//! # Tenant Gateway Main Entry Point

use migration::MigratorTrait;
use tenant_gateway::{config::ConfigLoader, db, server::run_server, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load()?;

    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    // Platform directory pool + migrations; tenant databases are reached
    // through the pool registry at request time.
    let platform_db = db::init_pool(&config).await?;
    migration::Migrator::up(&platform_db, None).await?;

    run_server(config, platform_db).await
}

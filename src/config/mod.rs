//! Configuration loading for the tenant gateway.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `GATEWAY_`, producing a typed [`AppConfig`]. Database credentials may also
//! come from mounted secret files (see [`crate::secrets`]).

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::secrets::{SecretSpec, resolve_secret};

/// Application configuration derived from `GATEWAY_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Connection URL for the platform directory database.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    /// Bearer tokens the (out-of-scope) web layer uses to call this gateway.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateway_tokens: Vec<String>,
    #[serde(default)]
    pub tenant_db: TenantDbConfig,
}

/// Settings governing tenant database pools and provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TenantDbConfig {
    /// Default host for tenant databases when `connection_info` omits one.
    #[serde(default = "default_postgres_host")]
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    /// Name of the platform's own control database. A tenant pool reporting
    /// this database is a misconfiguration and must be rejected.
    #[serde(default = "default_platform_database")]
    pub platform_database: String,
    /// Administrative database used only by the provisioning principal.
    #[serde(default = "default_maintenance_database")]
    pub maintenance_database: String,
    /// Login role used for provisioning; never reused for tenant queries.
    #[serde(default = "default_provision_user")]
    pub provision_user: String,
    /// Password for the provisioning principal (secret-resolved).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provision_password: Option<String>,
    /// Fallback password for tenant pools whose directory row omits one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_tenant_password: Option<String>,
    #[serde(default = "default_tenant_pool_max_connections")]
    pub pool_max_connections: u32,
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_idle_in_transaction_timeout_ms")]
    pub idle_in_transaction_timeout_ms: u64,
}

impl Default for TenantDbConfig {
    fn default() -> Self {
        Self {
            host: default_postgres_host(),
            port: default_postgres_port(),
            platform_database: default_platform_database(),
            maintenance_database: default_maintenance_database(),
            provision_user: default_provision_user(),
            provision_password: None,
            default_tenant_password: None,
            pool_max_connections: default_tenant_pool_max_connections(),
            statement_timeout_ms: default_statement_timeout_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            idle_in_transaction_timeout_ms: default_idle_in_transaction_timeout_ms(),
        }
    }
}

impl TenantDbConfig {
    /// Validate tenant database configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platform_database.trim().is_empty() {
            return Err(ConfigError::MissingPlatformDatabase);
        }
        if self.maintenance_database.trim().is_empty() {
            return Err(ConfigError::MissingMaintenanceDatabase);
        }
        if self.pool_max_connections == 0 || self.pool_max_connections > 100 {
            return Err(ConfigError::InvalidTenantPoolSize {
                value: self.pool_max_connections,
            });
        }
        if self.statement_timeout_ms == 0 {
            return Err(ConfigError::InvalidStatementTimeout {
                value: self.statement_timeout_ms,
            });
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            gateway_tokens: Vec::new(),
            tenant_db: TenantDbConfig::default(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns true for the development profile, which relaxes access gates
    /// and lets the pool registry fall back to default connection settings.
    pub fn is_development(&self) -> bool {
        self.profile == "local"
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.gateway_tokens.is_empty() {
            config.gateway_tokens = vec!["[REDACTED]".to_string()];
        }
        config.database_url = "[REDACTED]".to_string();
        if config.tenant_db.provision_password.is_some() {
            config.tenant_db.provision_password = Some("[REDACTED]".to_string());
        }
        if config.tenant_db.default_tenant_password.is_some() {
            config.tenant_db.default_tenant_password = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings
    /// are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway_tokens.is_empty() {
            return Err(ConfigError::MissingGatewayTokens);
        }

        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        self.tenant_db.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgresql://platform_admin@localhost:5432/platform_db".to_string()
}

fn default_db_max_connections() -> u32 {
    20
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_postgres_host() -> String {
    "postgres-primary".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_platform_database() -> String {
    "platform_db".to_string()
}

fn default_maintenance_database() -> String {
    "postgres".to_string()
}

fn default_provision_user() -> String {
    "postgres".to_string()
}

fn default_tenant_pool_max_connections() -> u32 {
    10
}

fn default_statement_timeout_ms() -> u64 {
    15_000
}

fn default_lock_timeout_ms() -> u64 {
    3_000
}

fn default_idle_in_transaction_timeout_ms() -> u64 {
    15_000
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("no gateway tokens configured; set GATEWAY_TOKEN or GATEWAY_TOKENS")]
    MissingGatewayTokens,
    #[error("platform database URL is missing; set GATEWAY_DATABASE_URL")]
    MissingDatabaseUrl,
    #[error("platform control database name must not be empty; set GATEWAY_PLATFORM_DATABASE")]
    MissingPlatformDatabase,
    #[error("maintenance database name must not be empty; set GATEWAY_MAINTENANCE_DATABASE")]
    MissingMaintenanceDatabase,
    #[error("tenant pool size must be between 1 and 100, got {value}")]
    InvalidTenantPoolSize { value: u32 },
    #[error("statement timeout must be positive, got {value}")]
    InvalidStatementTimeout { value: u64 },
}

/// Loads configuration using layered `.env` files and `GATEWAY_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration: `.env` layers first, process env wins.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("GATEWAY_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        // Gateway tokens: single token or comma-separated list.
        let gateway_tokens = if let Some(tokens) = layered.remove("TOKENS") {
            tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else if let Some(token) = layered.remove("TOKEN") {
            vec![token]
        } else {
            Vec::new()
        };

        let host = layered
            .remove("POSTGRES_HOST")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_postgres_host);
        let port = layered
            .remove("POSTGRES_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_postgres_port);
        let platform_database = layered
            .remove("PLATFORM_DATABASE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_platform_database);
        let maintenance_database = layered
            .remove("MAINTENANCE_DATABASE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_maintenance_database);
        let provision_user = layered
            .remove("PROVISION_USER")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_provision_user);
        let pool_max_connections = layered
            .remove("TENANT_POOL_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_tenant_pool_max_connections);
        let statement_timeout_ms = layered
            .remove("STATEMENT_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_statement_timeout_ms);
        let lock_timeout_ms = layered
            .remove("LOCK_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_lock_timeout_ms);
        let idle_in_transaction_timeout_ms = layered
            .remove("IDLE_IN_TRANSACTION_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_idle_in_transaction_timeout_ms);

        // The provisioning principal's password may come from env or a
        // mounted secret file; the generic password is the fallback.
        let provision_password = resolve_secret(&SecretSpec {
            value_env: Some("GATEWAY_PROVISION_PASSWORD"),
            file_env: Some("GATEWAY_PROVISION_PASSWORD_FILE"),
            default_file_path: None,
        })
        .or_else(|| {
            resolve_secret(&SecretSpec {
                value_env: Some("GATEWAY_POSTGRES_PASSWORD"),
                file_env: Some("GATEWAY_POSTGRES_PASSWORD_FILE"),
                default_file_path: Some("/run/secrets/db_password"),
            })
        });

        let default_tenant_password = resolve_secret(&SecretSpec {
            value_env: Some("GATEWAY_POSTGRES_PASSWORD"),
            file_env: Some("GATEWAY_POSTGRES_PASSWORD_FILE"),
            default_file_path: Some("/run/secrets/db_password"),
        });

        let tenant_db = TenantDbConfig {
            host,
            port,
            platform_database,
            maintenance_database,
            provision_user,
            provision_password,
            default_tenant_password,
            pool_max_connections,
            statement_timeout_ms,
            lock_timeout_ms,
            idle_in_transaction_timeout_ms,
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            gateway_tokens,
            tenant_db,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("GATEWAY_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("GATEWAY_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_gateway_tokens() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingGatewayTokens)
        ));
    }

    #[test]
    fn validate_accepts_minimal_config() {
        let config = AppConfig {
            gateway_tokens: vec!["token".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tenant_db_rejects_empty_platform_database() {
        let tenant_db = TenantDbConfig {
            platform_database: "".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            tenant_db.validate(),
            Err(ConfigError::MissingPlatformDatabase)
        ));
    }

    #[test]
    fn tenant_db_rejects_zero_pool_size() {
        let tenant_db = TenantDbConfig {
            pool_max_connections: 0,
            ..Default::default()
        };
        assert!(tenant_db.validate().is_err());
    }

    #[test]
    fn redacted_json_hides_secrets() {
        let config = AppConfig {
            gateway_tokens: vec!["super-secret".to_string()],
            tenant_db: TenantDbConfig {
                provision_password: Some("pg-password".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let json = config.redacted_json().unwrap();
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("pg-password"));
        assert!(json.contains("[REDACTED]"));
    }
}

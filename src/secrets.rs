//! Secret resolution with environment/file precedence.
//!
//! Credentials may arrive as plain environment variables, as a path held in a
//! `*_FILE` environment variable, or as a mounted secret file at a well-known
//! default path. Precedence is exactly that order; values are trimmed and
//! empty values are treated as absent.

use std::env;
use std::fs;
use std::path::Path;

/// Lookup description for one secret.
#[derive(Debug, Clone, Default)]
pub struct SecretSpec<'a> {
    /// Environment variable holding the secret value directly.
    pub value_env: Option<&'a str>,
    /// Environment variable holding a path to a file containing the secret.
    pub file_env: Option<&'a str>,
    /// Fallback mounted file path (e.g. `/run/secrets/db_password`).
    pub default_file_path: Option<&'a str>,
}

fn read_file_trimmed(path: &str) -> Option<String> {
    if path.is_empty() || !Path::new(path).exists() {
        return None;
    }
    let raw = fs::read_to_string(path).ok()?;
    let value = raw.replace(['\r', '\n'], "");
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Resolve a secret according to the env-value, env-file, default-file chain.
pub fn resolve_secret(spec: &SecretSpec<'_>) -> Option<String> {
    if let Some(var) = spec.value_env
        && let Ok(value) = env::var(var)
    {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    if let Some(var) = spec.file_env
        && let Ok(path) = env::var(var)
        && let Some(value) = read_file_trimmed(&path)
    {
        return Some(value);
    }

    if let Some(path) = spec.default_file_path
        && let Some(value) = read_file_trimmed(path)
    {
        return Some(value);
    }

    None
}

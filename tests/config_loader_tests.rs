use std::{
    env, fs,
    sync::{Mutex, MutexGuard, OnceLock},
};

use tempfile::TempDir;
use tenant_gateway::config::ConfigLoader;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        env::remove_var("GATEWAY_PROFILE");
        env::remove_var("GATEWAY_API_BIND_ADDR");
        env::remove_var("GATEWAY_LOG_LEVEL");
        env::remove_var("GATEWAY_TOKEN");
        env::remove_var("GATEWAY_TOKENS");
        env::remove_var("GATEWAY_PLATFORM_DATABASE");
        env::remove_var("GATEWAY_POSTGRES_PASSWORD");
        env::remove_var("GATEWAY_PROVISION_PASSWORD");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("GATEWAY_TOKEN", "test-token");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.tenant_db.platform_database, "platform_db");
    assert_eq!(cfg.tenant_db.maintenance_database, "postgres");
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "GATEWAY_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "GATEWAY_API_BIND_ADDR=192.168.0.10:5000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "GATEWAY_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "GATEWAY_PROFILE=test\nGATEWAY_API_BIND_ADDR=127.0.0.1:4000\nGATEWAY_TOKEN=layered-token\n",
    );

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("layered config loads");

    assert_eq!(cfg.profile, "test");
    // The most specific profile-local layer wins.
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    clear_env();
}

#[test]
fn process_env_overrides_files() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "GATEWAY_API_BIND_ADDR=127.0.0.1:3000\nGATEWAY_TOKEN=file-token\n",
    );

    unsafe {
        env::set_var("GATEWAY_API_BIND_ADDR", "0.0.0.0:9999");
    }

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9999");

    unsafe {
        env::remove_var("GATEWAY_API_BIND_ADDR");
    }
    clear_env();
}

#[test]
fn comma_separated_tokens_are_split() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("GATEWAY_TOKENS", "one, two ,three,");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.gateway_tokens, vec!["one", "two", "three"]);
    clear_env();
}

#[test]
fn missing_tokens_fail_validation() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    assert!(loader.load().is_err());
    clear_env();
}

#[test]
fn invalid_bind_addr_is_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("GATEWAY_TOKEN", "t");
        env::set_var("GATEWAY_API_BIND_ADDR", "not-an-addr");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    assert!(loader.load().is_err());

    clear_env();
}

#[test]
fn provision_password_resolves_from_env() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("GATEWAY_TOKEN", "t");
        env::set_var("GATEWAY_PROVISION_PASSWORD", "admin-secret");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(
        cfg.tenant_db.provision_password.as_deref(),
        Some("admin-secret")
    );
    clear_env();
}

#[test]
fn tenant_db_settings_load_from_env() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("GATEWAY_TOKEN", "t");
        env::set_var("GATEWAY_POSTGRES_HOST", "db.internal");
        env::set_var("GATEWAY_POSTGRES_PORT", "6543");
        env::set_var("GATEWAY_PLATFORM_DATABASE", "control_db");
    }

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.tenant_db.host, "db.internal");
    assert_eq!(cfg.tenant_db.port, 6543);
    assert_eq!(cfg.tenant_db.platform_database, "control_db");

    unsafe {
        env::remove_var("GATEWAY_POSTGRES_HOST");
        env::remove_var("GATEWAY_POSTGRES_PORT");
    }
    clear_env();
}

//! Tests for audit configuration resolution and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate FISCA_AUDIT_CONFIG are marked with #[serial]
//! to ensure they run sequentially, not in parallel.

use fisca_common::config::{AuditConfig, ConfigResolver, CONFIG_ENV_VAR, EQUILIBRIUM_TOLERANCE};
use fisca_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_cli_path_has_highest_priority() {
    let dir = TempDir::new().unwrap();
    let cli = write_config(&dir, "cli.toml", "tolerance = 0.5\n");
    let from_env = write_config(&dir, "env.toml", "tolerance = 0.2\n");
    env::set_var(CONFIG_ENV_VAR, &from_env);

    let config = ConfigResolver::new(Some(cli)).resolve().unwrap();
    assert_eq!(config.tolerance, 0.5);

    // Cleanup
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_path() {
    let dir = TempDir::new().unwrap();
    let from_env = write_config(
        &dir,
        "env.toml",
        "variation_threshold_pct = 20.0\n[fiscal]\nimf_minimum = 1000000.0\n",
    );
    env::set_var(CONFIG_ENV_VAR, &from_env);

    let config = ConfigResolver::new(None).resolve().unwrap();
    assert_eq!(config.variation_threshold_pct, 20.0);
    assert_eq!(config.fiscal.imf_minimum, 1_000_000.0);
    // Untouched keys keep their defaults
    assert_eq!(config.tolerance, EQUILIBRIUM_TOLERANCE);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.toml");

    let result = ConfigResolver::new(Some(missing)).resolve();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_invalid_values_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "bad.toml", "blocking_score_ceiling = 150\n");
    env::set_var(CONFIG_ENV_VAR, &path);

    let result = ConfigResolver::new(None).resolve();
    assert!(result.is_err());

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_empty_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");

    // Falls through to the user file or defaults; either way it must load
    let config = ConfigResolver::new(None).resolve();
    assert!(config.is_ok());

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_load_from_file_roundtrip() {
    let dir = TempDir::new().unwrap();
    let original = AuditConfig {
        bilan_variation_threshold_pct: 15.0,
        ..AuditConfig::default()
    };
    let path = write_config(&dir, "audit.toml", &toml::to_string(&original).unwrap());

    let loaded = AuditConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, original);
}

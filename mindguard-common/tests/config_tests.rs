//! Tests for configuration file resolution and loading
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate MINDGUARD_CONFIG are marked with #[serial].

use mindguard_common::config::{load_toml_config, resolve_config_path, CONFIG_ENV_VAR};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
struct SampleConfig {
    port: u16,
    name: String,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            name: "default".to_string(),
        }
    }
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/mindguard-env-config.toml");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/mindguard-env-config.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_missing_path_yields_defaults() {
    let config: SampleConfig = load_toml_config(None).unwrap();
    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port = 6100").unwrap();

    let config: SampleConfig = load_toml_config(Some(file.path())).unwrap();
    assert_eq!(config.port, 6100);
    assert_eq!(config.name, "default");
}

#[test]
fn test_invalid_toml_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port = \"not a number\"").unwrap();

    let result: mindguard_common::Result<SampleConfig> = load_toml_config(Some(file.path()));
    assert!(result.is_err());
}

#[test]
fn test_unreadable_explicit_path_is_an_error() {
    let result: mindguard_common::Result<SampleConfig> =
        load_toml_config(Some(Path::new("/nonexistent/mindguard/config.toml")));
    assert!(result.is_err());
}

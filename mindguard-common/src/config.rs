//! Configuration file resolution and loading
//!
//! Resolution order for the service TOML file:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory (`~/.config/mindguard/config.toml` on Linux)
//! 4. System config (`/etc/mindguard/config.toml`, Linux only)
//! 5. None: built-in defaults

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "MINDGUARD_CONFIG";

/// Resolve which config file to read, if any
///
/// An explicit path (CLI or env) is returned even when it does not exist so
/// the caller can report it; discovered paths are only returned when present.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: platform locations
    default_config_locations().into_iter().find(|p| p.exists())
}

/// Platform config file locations, most specific first
pub fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("mindguard").join("config.toml"));
    }

    if cfg!(target_os = "linux") {
        locations.push(PathBuf::from("/etc/mindguard/config.toml"));
    }

    locations
}

/// Load a TOML config, falling back to `T::default()` when no file applies
///
/// # Errors
/// - the file cannot be read
/// - the file is not valid TOML for `T`
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No configuration file found, using built-in defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;

    let config = toml::from_str::<T>(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

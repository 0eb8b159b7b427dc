//! Configuration file location, TOML loading, and credential resolution
//!
//! Config file priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`~/.config/jnj/config.toml` on Linux)
//! 4. Compiled defaults (no file)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "JNJ_CONFIG";

/// Logging section shared by every jnj binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Resolve the config file path.
///
/// Returns `None` when no explicit path is given and the per-user file does
/// not exist; callers then run on compiled defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = default_config_path()?;
    if user_config.exists() {
        Some(user_config)
    } else {
        None
    }
}

/// Per-user config file location for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("jnj").join("config.toml"))
}

/// Load and parse a TOML config file.
///
/// A missing file is an error here; use [`load_or_default`] when a missing
/// file should fall back to defaults.
pub fn load_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load config from `path` if present, otherwise return `T::default()`.
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) if path.exists() => {
            info!("Loading config from {}", path.display());
            load_toml_config(path)
        }
        Some(path) => {
            warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            );
            Ok(T::default())
        }
        None => Ok(T::default()),
    }
}

/// Validate a credential value (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve a credential from environment variables, then the TOML value.
///
/// **Priority:** ENV (first valid of `env_vars`) → TOML
///
/// Logs a warning when both sources hold a value, since the TOML value is
/// then silently ignored.
pub fn resolve_secret(
    label: &str,
    env_vars: &[&str],
    toml_value: Option<&str>,
) -> Option<String> {
    let env_value = env_vars
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| is_valid_key(value));
    let toml_value = toml_value.filter(|value| is_valid_key(value));

    match (env_value, toml_value) {
        (Some(env), Some(_)) => {
            warn!(
                "{} found in both environment and TOML config. Using environment (highest priority).",
                label
            );
            Some(env)
        }
        (Some(env), None) => {
            info!("{} loaded from environment variable", label);
            Some(env)
        }
        (None, Some(toml)) => {
            info!("{} loaded from TOML config", label);
            Some(toml.to_string())
        }
        (None, None) => None,
    }
}

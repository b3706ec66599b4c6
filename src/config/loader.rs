// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::ServiceConfig;
use crate::config::validate::validate_config;
use crate::errors::Result;

/// On-disk encodings understood by the loader, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// `.json` selects JSON; everything else is treated as TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Load a configuration file from a given path and return the raw
/// `ServiceConfig`.
///
/// This only performs deserialization; it does **not** apply defaults for
/// zero-valued fields or check name uniqueness. Use [`load_and_validate`] for
/// that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ServiceConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config = match ConfigFormat::from_path(path) {
        ConfigFormat::Toml => toml::from_str(&contents)?,
        ConfigFormat::Json => serde_json::from_str(&contents)?,
    };

    Ok(config)
}

/// Load a configuration file from path and run basic validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML (or JSON for `.json` files).
/// - Applies defaults (serde defaults, then zero-valued interval /
///   max_log_lines are replaced).
/// - Checks names and paths, and that names are unique.
///
/// A missing file yields an empty default configuration, so a fresh install
/// can start with no scripts declared.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ServiceConfig> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(?path, "config file not found; using defaults");
        return Ok(ServiceConfig::default());
    }

    let mut config = load_from_path(path)?;
    config.scripts = config
        .scripts
        .into_iter()
        .map(|s| s.with_defaults())
        .collect();
    validate_config(&config)?;
    Ok(config)
}

/// Write a configuration back to disk in the format implied by the path.
pub fn save_to_path(path: impl AsRef<Path>, config: &ServiceConfig) -> Result<()> {
    let path = path.as_ref();
    let contents = match ConfigFormat::from_path(path) {
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, contents)?;
    debug!(?path, scripts = config.scripts.len(), "config saved");
    Ok(())
}

/// Helper to resolve a default config path.
///
/// Currently this just returns `Scriptd.toml` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Scriptd.toml")
}

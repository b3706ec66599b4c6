// src/config/mod.rs

//! Service configuration: the declared script set and where logs live.
//!
//! - [`model`] holds the serde types.
//! - [`loader`] reads and writes TOML / JSON files.
//! - [`validate`] performs boundary checks on names and paths.
//! - [`duration`] parses `"30s"` / `"5m"` / `"1h"` strings for the CLI.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path, save_to_path};
pub use model::{
    DEFAULT_INTERVAL_SECS, DEFAULT_MAX_LOG_LINES, DEFAULT_WEB_PORT, ScriptConfig, ServiceConfig,
};
pub use validate::{validate_config, validate_script};

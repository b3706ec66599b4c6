// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ScriptConfig, ServiceConfig};
use crate::errors::{Result, ScriptdError};

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - every script passes [`validate_script`]
/// - script names are unique
///
/// It does **not** check that the script files exist; a missing executable
/// is an execution-time failure (exit code -1), not a config error.
pub fn validate_config(cfg: &ServiceConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for script in &cfg.scripts {
        validate_script(script)?;
        if !seen.insert(script.name.as_str()) {
            return Err(ScriptdError::DuplicateName(script.name.clone()));
        }
    }
    Ok(())
}

/// Boundary checks for a single script definition.
///
/// The name doubles as the log file stem, so it must be usable as a single
/// path component.
pub fn validate_script(script: &ScriptConfig) -> Result<()> {
    validate_name(&script.name)?;

    if script.path.as_os_str().is_empty() {
        return Err(ScriptdError::Validation(format!(
            "script '{}' has an empty path",
            script.name
        )));
    }

    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ScriptdError::Validation(
            "script name cannot be empty".to_string(),
        ));
    }
    if name == "." || name == ".." {
        return Err(ScriptdError::Validation(format!(
            "script name '{name}' is reserved"
        )));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(ScriptdError::Validation(format!(
            "script name '{name}' cannot contain path separators"
        )));
    }
    Ok(())
}

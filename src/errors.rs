// src/errors.rs

//! Crate-wide error types.
//!
//! Two families live here:
//! - [`ScriptdError`]: structural failures returned synchronously to callers
//!   of the manager, the log store and the config layer.
//! - [`ExecError`]: the outcome of a single failed execution. These are
//!   recovered inside the runner loop and only surface to callers of a manual
//!   run via [`ScriptdError::Execution`].

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptdError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Script not found: {0}")]
    NotFound(String),

    #[error("Script already exists: {0}")]
    DuplicateName(String),

    #[error("Script already running: {0}")]
    AlreadyRunning(String),

    #[error("Script not running: {0}")]
    NotRunning(String),

    #[error("Execution failed: {0}")]
    Execution(#[from] ExecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a single execution did not succeed.
///
/// Infra and timeout failures both report exit code -1 in the
/// [`ExecutionResult`](crate::exec::ExecutionResult); the variant (and the
/// message streamed to the log sink) tells them apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("infrastructure failure: {0}")]
    Infra(String),

    #[error("script exited with code {0}")]
    ScriptExit(i32),

    #[error("execution timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("execution cancelled")]
    Cancelled,
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ScriptdError>;

// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running scripts, using
//! `tokio::process::Command`, and streaming their output back to the caller
//! while they run.
//!
//! - [`context`] holds [`ExecContext`], the cancellation token + deadline a
//!   single execution is bounded by.
//! - [`handler`] defines the [`LogHandler`] callbacks that receive
//!   start / line / end notifications.
//! - [`process`] wraps OS process-group signalling behind [`ProcessHandle`].
//! - [`executor`] owns [`ProcessExecutor`], which spawns, streams, times out
//!   and cleans up one script execution.
//! - [`backend`] provides the [`ScriptExecutor`] trait the runner talks to,
//!   which tests can replace with a fake implementation.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::ExecError;

pub mod backend;
pub mod context;
pub mod executor;
pub mod handler;
pub mod process;

pub use backend::ScriptExecutor;
pub use context::ExecContext;
pub use executor::ProcessExecutor;
pub use handler::{LogHandler, NoopLogHandler};
pub use process::ProcessHandle;

/// Exit code reported when the script never produced one of its own:
/// spawn / pipe / wait failures, timeouts and cancellations.
pub const INFRA_EXIT_CODE: i32 = -1;

/// Outcome of one execution. Created once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    /// Trimmed, newline-joined stdout lines, identical to what was streamed.
    pub stdout: String,
    /// Trimmed, newline-joined stderr lines, identical to what was streamed.
    pub stderr: String,
    /// When the execution started.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time from start to the end notification.
    pub duration: Duration,
    /// Set when the run ended for a reason other than the script's own exit.
    pub error: Option<ExecError>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    /// Map the result onto the per-execution error taxonomy.
    pub fn check(&self) -> Result<(), ExecError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.exit_code != 0 {
            return Err(ExecError::ScriptExit(self.exit_code));
        }
        Ok(())
    }

    pub fn duration_millis(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

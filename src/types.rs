use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status carried by a [`ScriptStatusEvent`](crate::events::ScriptStatusEvent).
///
/// - `Starting`: the runner is about to hand the script to the executor.
/// - `Running`: the executor has begun the execution.
/// - `Completed`: the script exited with code 0.
/// - `Failed`: non-zero exit, timeout, cancellation or infrastructure failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStatus {
    Starting,
    Running,
    Completed,
    Failed,
}

impl ScriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptStatus::Starting => "starting",
            ScriptStatus::Running => "running",
            ScriptStatus::Completed => "completed",
            ScriptStatus::Failed => "failed",
        }
    }

    /// True for the two statuses that close an invocation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScriptStatus::Completed | ScriptStatus::Failed)
    }
}

impl fmt::Display for ScriptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "starting" => Ok(ScriptStatus::Starting),
            "running" => Ok(ScriptStatus::Running),
            "completed" => Ok(ScriptStatus::Completed),
            "failed" => Ok(ScriptStatus::Failed),
            other => Err(format!(
                "invalid script status: {other} (expected starting, running, completed or failed)"
            )),
        }
    }
}

/// Which pipe a streamed output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "STDOUT",
            OutputStream::Stderr => "STDERR",
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Script configuration fields tracked by change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeField {
    Path,
    Interval,
    Enabled,
    MaxLogLines,
    Timeout,
}

impl ChangeField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeField::Path => "path",
            ChangeField::Interval => "interval",
            ChangeField::Enabled => "enabled",
            ChangeField::MaxLogLines => "max_log_lines",
            ChangeField::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ChangeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

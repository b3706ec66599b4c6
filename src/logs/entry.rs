// src/logs/entry.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exec::ExecutionResult;

/// One completed (or forcibly terminated) execution, as persisted.
///
/// Serialized as a single JSON object per line:
///
/// ```json
/// {"timestamp":"2025-08-02T11:26:16Z","script_name":"backup","exit_code":0,"stdout":"ok","stderr":"","duration_ms":412}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub script_name: String,
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(rename = "duration_ms", default)]
    pub duration_ms: u64,
}

impl LogEntry {
    pub fn from_result(script_name: impl Into<String>, result: &ExecutionResult) -> Self {
        Self {
            timestamp: result.timestamp,
            script_name: script_name.into(),
            exit_code: result.exit_code,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            duration_ms: result.duration_millis(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

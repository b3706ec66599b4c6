// src/logs/query.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logs::LogEntry;

/// Filter for [`LogManager::query_logs`](crate::logs::LogManager::query_logs).
///
/// Every criterion is optional. Time bounds are inclusive. `limit` keeps the
/// most recent matches; `None` and `Some(0)` both mean unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl LogQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_script(name: impl Into<String>) -> Self {
        Self {
            script_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Effective limit, with zero treated as unlimited.
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|&n| n > 0)
    }

    /// Time and exit-code criteria. The script name is applied by the
    /// manager when it picks which loggers to read.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.start_time.is_some_and(|start| entry.timestamp < start) {
            return false;
        }
        if self.end_time.is_some_and(|end| entry.timestamp > end) {
            return false;
        }
        if self.exit_code.is_some_and(|code| entry.exit_code != code) {
            return false;
        }
        true
    }
}

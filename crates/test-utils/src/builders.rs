#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use scriptd::config::{ScriptConfig, ServiceConfig};
use scriptd::logs::LogEntry;

/// Builder for `ServiceConfig` to simplify test setup.
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
        }
    }

    pub fn with_script(mut self, script: ScriptConfig) -> Self {
        self.config.scripts.push(script);
        self
    }

    pub fn logs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.logs_dir = dir.into();
        self
    }

    pub fn web_port(mut self, port: u16) -> Self {
        self.config.web_port = port;
        self
    }

    pub fn build(self) -> ServiceConfig {
        self.config
    }
}

impl Default for ServiceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ScriptConfig`.
pub struct ScriptConfigBuilder {
    script: ScriptConfig,
}

impl ScriptConfigBuilder {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            script: ScriptConfig::new(name, path),
        }
    }

    pub fn interval(mut self, secs: u64) -> Self {
        self.script.interval = secs;
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.script.timeout = secs;
        self
    }

    pub fn max_log_lines(mut self, n: usize) -> Self {
        self.script.max_log_lines = n;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.script.enabled = enabled;
        self
    }

    pub fn disabled(self) -> Self {
        self.enabled(false)
    }

    pub fn build(self) -> ScriptConfig {
        self.script
    }
}

/// Builder for `LogEntry` values with deterministic timestamps.
pub struct LogEntryBuilder {
    entry: LogEntry,
}

impl LogEntryBuilder {
    /// An entry for `script` at `2025-01-01T00:00:00Z + offset_secs`.
    pub fn new(script: &str, offset_secs: i64) -> Self {
        Self {
            entry: LogEntry {
                timestamp: base_time() + ChronoDuration::seconds(offset_secs),
                script_name: script.to_string(),
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 0,
            },
        }
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.entry.exit_code = code;
        self
    }

    pub fn stdout(mut self, out: &str) -> Self {
        self.entry.stdout = out.to_string();
        self
    }

    pub fn stderr(mut self, err: &str) -> Self {
        self.entry.stderr = err.to_string();
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.entry.duration_ms = ms;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.entry.timestamp = timestamp;
        self
    }

    pub fn build(self) -> LogEntry {
        self.entry
    }
}

/// Fixed reference instant used by [`LogEntryBuilder`].
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .expect("valid base time")
}

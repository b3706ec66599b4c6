// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Interval applied when a script does not specify one (one hour).
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

/// In-memory history window applied when a script does not specify one.
pub const DEFAULT_MAX_LOG_LINES: usize = 100;

pub const DEFAULT_WEB_PORT: u16 = 8080;

/// Top-level service configuration as read from `Scriptd.toml`.
///
/// ```toml
/// web_port = 8080
/// logs_dir = "logs"
///
/// [[scripts]]
/// name = "backup"
/// path = "./backup.sh"
/// interval = 300
/// enabled = true
/// max_log_lines = 100
/// timeout = 60
/// ```
///
/// `web_port` belongs to the web adapter; the core only carries it through so
/// that saving the config does not drop it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    /// Directory holding one `<script-name>.log` file per script.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Declared scripts, scheduled or not. Names are unique.
    ///
    /// Kept last so the TOML serializer emits scalars before the
    /// `[[scripts]]` tables.
    #[serde(default)]
    pub scripts: Vec<ScriptConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            web_port: default_web_port(),
            logs_dir: default_logs_dir(),
            scripts: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn find(&self, name: &str) -> Option<&ScriptConfig> {
        self.scripts.iter().find(|s| s.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut ScriptConfig> {
        self.scripts.iter_mut().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Declared scripts with `enabled = true`, in declaration order.
    pub fn enabled_scripts(&self) -> impl Iterator<Item = &ScriptConfig> {
        self.scripts.iter().filter(|s| s.enabled)
    }
}

/// One `[[scripts]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Unique key; also the stem of the script's log file.
    pub name: String,

    /// Executable to run. Relative paths resolve against the daemon's
    /// working directory.
    pub path: PathBuf,

    /// Seconds between executions. `0` means "unset" and is replaced by
    /// [`DEFAULT_INTERVAL_SECS`] when defaults are applied.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Declared state only; whether a runner is live is tracked separately
    /// by the manager.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Size of the in-memory history window.
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,

    /// Seconds before a run is terminated; `0` means unbounded.
    #[serde(default)]
    pub timeout: u64,
}

impl ScriptConfig {
    /// A config with every optional field at its default.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            interval: DEFAULT_INTERVAL_SECS,
            enabled: true,
            max_log_lines: DEFAULT_MAX_LOG_LINES,
            timeout: 0,
        }
    }

    /// Replace unset (zero) interval / max_log_lines with their defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.interval == 0 {
            self.interval = DEFAULT_INTERVAL_SECS;
        }
        if self.max_log_lines == 0 {
            self.max_log_lines = DEFAULT_MAX_LOG_LINES;
        }
        self
    }

    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// `None` when the script may run for as long as it likes.
    pub fn timeout_duration(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_enabled() -> bool {
    true
}

fn default_max_log_lines() -> usize {
    DEFAULT_MAX_LOG_LINES
}

fn default_web_port() -> u16 {
    DEFAULT_WEB_PORT
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

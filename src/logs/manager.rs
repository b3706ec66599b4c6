// src/logs/manager.rs

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::config::{DEFAULT_MAX_LOG_LINES, ScriptConfig};
use crate::errors::{Result, ScriptdError};
use crate::logs::{LogEntry, LogQuery, ScriptLogger};

/// Registry of per-script loggers rooted at one directory.
///
/// The map has its own lock, separate from each logger's. Queries clone the
/// `Arc`s under a read lock and release it before touching any logger, so a
/// slow writer on one script never blocks reads of another.
#[derive(Debug)]
pub struct LogManager {
    base_dir: PathBuf,
    loggers: RwLock<HashMap<String, Arc<ScriptLogger>>>,
}

impl LogManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            loggers: RwLock::new(HashMap::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Logger for `script_name`, created with the default window if needed.
    pub fn get_logger(&self, script_name: &str) -> Arc<ScriptLogger> {
        self.get_or_create(script_name, DEFAULT_MAX_LOG_LINES)
    }

    /// Logger sized to the script's `max_log_lines`. An existing logger is
    /// resized in place.
    pub fn logger_for(&self, config: &ScriptConfig) -> Arc<ScriptLogger> {
        let logger = self.get_or_create(&config.name, config.max_log_lines);
        if logger.max_entries() != config.max_log_lines.max(1) {
            logger.set_max_entries(config.max_log_lines);
        }
        logger
    }

    /// Logger for `script_name` if one has been registered.
    pub fn find_logger(&self, script_name: &str) -> Option<Arc<ScriptLogger>> {
        self.read().get(script_name).cloned()
    }

    /// Names of every registered logger, sorted.
    pub fn script_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Register a logger for every `<name>.log` file already in the base
    /// directory. Returns how many were newly registered.
    pub fn load_existing(&self) -> Result<usize> {
        let dir = match fs::read_dir(&self.base_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut loaded = 0;
        for item in dir {
            let path = item?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "log") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if self.find_logger(name).is_none() {
                self.get_logger(name);
                loaded += 1;
            }
        }

        info!(dir = %self.base_dir.display(), loaded, "discovered existing log files");
        Ok(loaded)
    }

    /// Entries matching `query` across one or all scripts, oldest first.
    ///
    /// When `limit` truncates, the most recent matches are kept. An unknown
    /// script name yields an empty result.
    pub fn query_logs(&self, query: &LogQuery) -> Vec<LogEntry> {
        let loggers: Vec<Arc<ScriptLogger>> = {
            let map = self.read();
            match &query.script_name {
                Some(name) => map.get(name).cloned().into_iter().collect(),
                None => map.values().cloned().collect(),
            }
        };

        let mut matched: Vec<LogEntry> = loggers
            .iter()
            .flat_map(|logger| logger.entries())
            .filter(|entry| query.matches(entry))
            .collect();

        matched.sort_by_key(|entry| entry.timestamp);

        if let Some(limit) = query.effective_limit() {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }

        debug!(?query, returned = matched.len(), "log query");
        matched
    }

    /// Truncate a script's history in memory and on disk.
    pub fn clear_logs(&self, script_name: &str) -> Result<()> {
        let logger = self
            .find_logger(script_name)
            .ok_or_else(|| ScriptdError::NotFound(script_name.to_string()))?;
        logger.clear()
    }

    fn get_or_create(&self, script_name: &str, max_entries: usize) -> Arc<ScriptLogger> {
        if let Some(logger) = self.find_logger(script_name) {
            return logger;
        }

        let mut map = self.loggers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(script_name.to_string()).or_insert_with(|| {
            Arc::new(ScriptLogger::new(script_name, &self.base_dir, max_entries))
        }))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ScriptLogger>>> {
        self.loggers.read().unwrap_or_else(PoisonError::into_inner)
    }
}

// src/logs/logger.rs

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::errors::Result;
use crate::logs::LogEntry;
use crate::logs::legacy::{self, LegacyDecoder};

/// Durable, append-only execution history of one script.
///
/// The file at `<base_dir>/<script_name>.log` receives every entry, one JSON
/// record per line, and is never trimmed by the logger. Memory holds only
/// the most recent `max_entries` of them.
pub struct ScriptLogger {
    script_name: String,
    path: PathBuf,
    state: RwLock<LoggerState>,
}

struct LoggerState {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    /// Lazily opened append handle, dropped after a write error so the next
    /// write reopens the file.
    file: Option<File>,
}

impl LoggerState {
    fn trim(&mut self) {
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    /// Replace the window with the tail of the file. Memory is kept as is
    /// when the file is missing or unreadable.
    fn replay(&mut self, script_name: &str, path: &Path) {
        match load_entries(script_name, path) {
            Ok(entries) => {
                debug!(
                    script = %script_name,
                    count = entries.len(),
                    "replayed existing log entries"
                );
                self.entries = entries.into();
                self.trim();
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read existing log file");
            }
        }
    }

    fn append_line(&mut self, path: &Path, line: &str) -> io::Result<()> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => open_append(path)?,
        };
        let written = file
            .write_all(line.as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.flush());
        if written.is_ok() {
            self.file = Some(file);
        }
        written
    }
}

impl ScriptLogger {
    /// Create the logger and replay whatever history `<name>.log` already
    /// holds. Problems reading the directory or file are logged, not fatal:
    /// the logger still works in memory and retries the file on each write.
    pub fn new(script_name: impl Into<String>, base_dir: &Path, max_entries: usize) -> Self {
        let script_name = script_name.into();
        let path = base_dir.join(format!("{script_name}.log"));

        if let Err(e) = fs::create_dir_all(base_dir) {
            warn!(dir = %base_dir.display(), error = %e, "failed to create log directory");
        }

        let mut state = LoggerState {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
            file: None,
        };

        state.replay(&script_name, &path);

        Self {
            script_name,
            path,
            state: RwLock::new(state),
        }
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an entry in memory and append it to the file.
    ///
    /// The in-memory window is updated first and is not rolled back when
    /// the write fails; the I/O error is still returned to the caller.
    pub fn add_entry(&self, entry: LogEntry) -> Result<()> {
        let line = serde_json::to_string(&entry)?;

        let mut state = self.write();
        state.entries.push_back(entry);
        state.trim();

        if let Err(e) = state.append_line(&self.path, &line) {
            warn!(
                script = %self.script_name,
                path = %self.path.display(),
                error = %e,
                "failed to append log entry"
            );
            return Err(e.into());
        }
        Ok(())
    }

    /// Snapshot of the in-memory window, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.read().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.read().max_entries
    }

    /// Resize the in-memory window. Shrinking drops the oldest entries from
    /// memory only; the file is untouched. Growing a full window refills it
    /// from the file so memory stays equal to the file's tail.
    pub fn set_max_entries(&self, max_entries: usize) {
        let max_entries = max_entries.max(1);
        let mut state = self.write();
        let refill = max_entries > state.max_entries && state.entries.len() >= state.max_entries;
        state.max_entries = max_entries;
        if refill {
            state.replay(&self.script_name, &self.path);
        }
        state.trim();
    }

    /// Drop every entry from memory and truncate the file.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.write();
        state.entries.clear();
        state.file = None;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        debug!(script = %self.script_name, "cleared log entries");
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, LoggerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LoggerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ScriptLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptLogger")
            .field("script_name", &self.script_name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Replay a log file.
///
/// Lines are decoded as JSON records until the first legacy block header;
/// from there the legacy decoder takes over for the rest of the file. Lines
/// that fit neither format are skipped.
fn load_entries(script_name: &str, path: &Path) -> io::Result<Vec<LogEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    let mut legacy: Option<LegacyDecoder> = None;
    let mut skipped = 0usize;

    for raw in reader.split(b'\n') {
        let raw = raw?;
        let decoded = String::from_utf8_lossy(&raw);
        let line = decoded.trim();

        if let Some(decoder) = legacy.as_mut() {
            entries.extend(decoder.feed(line));
            continue;
        }

        if line.is_empty() {
            continue;
        }

        if let Ok(entry) = serde_json::from_str::<LogEntry>(line) {
            entries.push(entry);
            continue;
        }

        if legacy::is_header(line) {
            debug!(path = %path.display(), "switching to legacy log format");
            let mut decoder = LegacyDecoder::new(script_name);
            entries.extend(decoder.feed(line));
            legacy = Some(decoder);
            continue;
        }

        skipped += 1;
    }

    if let Some(decoder) = legacy {
        entries.extend(decoder.finish());
    }

    if skipped > 0 {
        debug!(path = %path.display(), skipped, "skipped malformed log lines");
    }

    Ok(entries)
}

// src/logs/legacy.rs

//! Decoder for the block-delimited text format older log files use:
//!
//! ```text
//! [2025-08-02 11:26:16] Exit code: 0
//! STDOUT: first line
//! second line
//! STDERR: warning
//! --------------------------------------------------
//! ```
//!
//! Timestamps carry no zone and are read as UTC. Durations were never
//! recorded, so decoded entries report `0`. Structured JSON records appended
//! after the last block are still picked up.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::logs::LogEntry;
use crate::types::OutputStream;

pub const SEPARATOR: &str = "--------------------------------------------------";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\] Exit code: (-?\d+)$").ok());

/// Parse a block header, returning its timestamp and exit code.
///
/// An unparseable timestamp falls back to the Unix epoch rather than
/// rejecting the whole block.
pub fn parse_header(line: &str) -> Option<(DateTime<Utc>, i32)> {
    let caps = HEADER.as_ref()?.captures(line)?;
    let exit_code = caps.get(2)?.as_str().parse::<i32>().ok()?;
    let timestamp = caps
        .get(1)
        .and_then(|m| NaiveDateTime::parse_from_str(m.as_str(), TIMESTAMP_FORMAT).ok())
        .map(|naive| naive.and_utc())
        .unwrap_or_default();
    Some((timestamp, exit_code))
}

pub fn is_header(line: &str) -> bool {
    parse_header(line).is_some()
}

/// Render an entry in the legacy block format. Used to produce fixtures and
/// by tooling that still consumes the old layout.
pub fn render_block(entry: &LogEntry) -> String {
    let mut out = format!(
        "[{}] Exit code: {}\n",
        entry.timestamp.format(TIMESTAMP_FORMAT),
        entry.exit_code
    );
    if !entry.stdout.is_empty() {
        out.push_str(&format!("STDOUT: {}\n", entry.stdout));
    }
    if !entry.stderr.is_empty() {
        out.push_str(&format!("STDERR: {}\n", entry.stderr));
    }
    out.push_str(SEPARATOR);
    out.push('\n');
    out
}

struct Block {
    timestamp: DateTime<Utc>,
    exit_code: i32,
    section: OutputStream,
    stdout: Vec<String>,
    stderr: Vec<String>,
}

impl Block {
    fn push(&mut self, stream: OutputStream, text: &str) {
        self.section = stream;
        match stream {
            OutputStream::Stdout => self.stdout.push(text.to_string()),
            OutputStream::Stderr => self.stderr.push(text.to_string()),
        }
    }

    fn into_entry(self, script_name: &str) -> LogEntry {
        LogEntry {
            timestamp: self.timestamp,
            script_name: script_name.to_string(),
            exit_code: self.exit_code,
            stdout: self.stdout.join("\n"),
            stderr: self.stderr.join("\n"),
            duration_ms: 0,
        }
    }
}

/// Line-at-a-time state machine. Feed trimmed lines in file order and call
/// [`LegacyDecoder::finish`] at end of input.
pub struct LegacyDecoder {
    script_name: String,
    current: Option<Block>,
}

impl LegacyDecoder {
    pub fn new(script_name: impl Into<String>) -> Self {
        Self {
            script_name: script_name.into(),
            current: None,
        }
    }

    /// Consume one line, returning any entries it completed.
    pub fn feed(&mut self, line: &str) -> Vec<LogEntry> {
        let mut done = Vec::new();

        if line == SEPARATOR {
            done.extend(self.close());
            return done;
        }

        if let Some((timestamp, exit_code)) = parse_header(line) {
            // A header without a separator before it still starts a new block.
            done.extend(self.close());
            self.current = Some(Block {
                timestamp,
                exit_code,
                section: OutputStream::Stdout,
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
            return done;
        }

        if line.starts_with('{') {
            if let Ok(entry) = serde_json::from_str::<LogEntry>(line) {
                done.extend(self.close());
                done.push(entry);
                return done;
            }
        }

        let Some(block) = self.current.as_mut() else {
            return done;
        };

        if let Some(rest) = line.strip_prefix("STDOUT:") {
            block.push(OutputStream::Stdout, rest.strip_prefix(' ').unwrap_or(rest));
        } else if let Some(rest) = line.strip_prefix("STDERR:") {
            block.push(OutputStream::Stderr, rest.strip_prefix(' ').unwrap_or(rest));
        } else if !line.is_empty() {
            let section = block.section;
            block.push(section, line);
        }
        done
    }

    /// Flush a trailing block that was not closed by a separator.
    pub fn finish(mut self) -> Option<LogEntry> {
        self.close()
    }

    fn close(&mut self) -> Option<LogEntry> {
        self.current
            .take()
            .map(|block| block.into_entry(&self.script_name))
    }
}

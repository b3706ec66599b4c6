// src/exec/handler.rs

use chrono::{DateTime, Utc};

use crate::types::OutputStream;

/// Callbacks invoked while an execution is in flight.
///
/// `on_start` and `on_end` always come in matched pairs, even when the
/// process could not be spawned. `on_line` is called from the output drain
/// tasks as each line arrives, so implementations must be cheap and must not
/// block.
pub trait LogHandler: Send + Sync {
    fn on_start(&self, _timestamp: DateTime<Utc>) {}

    fn on_line(&self, timestamp: DateTime<Utc>, stream: OutputStream, line: &str);

    fn on_end(&self, _timestamp: DateTime<Utc>, _exit_code: i32) {}
}

/// Handler that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogHandler;

impl LogHandler for NoopLogHandler {
    fn on_line(&self, _timestamp: DateTime<Utc>, _stream: OutputStream, _line: &str) {}
}

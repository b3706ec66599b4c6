use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use scriptd::exec::LogHandler;
use scriptd::types::OutputStream;

/// One callback observed by [`RecordingHandler`], with the wall-clock
/// instant it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Start,
    Line(OutputStream, String),
    End(i32),
}

/// `LogHandler` that remembers every callback in arrival order.
#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<(Instant, Recorded)>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn timed_events(&self) -> Vec<(Instant, Recorded)> {
        self.seen.lock().unwrap().clone()
    }

    /// Lines seen on `stream`, in order.
    pub fn lines(&self, stream: OutputStream) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Line(s, line) if s == stream => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn count_starts(&self) -> usize {
        self.events()
            .iter()
            .filter(|r| matches!(r, Recorded::Start))
            .count()
    }

    pub fn count_ends(&self) -> usize {
        self.events()
            .iter()
            .filter(|r| matches!(r, Recorded::End(_)))
            .count()
    }

    fn push(&self, r: Recorded) {
        self.seen.lock().unwrap().push((Instant::now(), r));
    }
}

impl LogHandler for RecordingHandler {
    fn on_start(&self, _timestamp: DateTime<Utc>) {
        self.push(Recorded::Start);
    }

    fn on_line(&self, _timestamp: DateTime<Utc>, stream: OutputStream, line: &str) {
        self.push(Recorded::Line(stream, line.to_string()));
    }

    fn on_end(&self, _timestamp: DateTime<Utc>, exit_code: i32) {
        self.push(Recorded::End(exit_code));
    }
}

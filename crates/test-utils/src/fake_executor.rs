use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use scriptd::exec::{ExecContext, ExecutionResult, INFRA_EXIT_CODE, LogHandler, ScriptExecutor};
use scriptd::types::OutputStream;

/// One recorded call to [`FakeExecutor`].
#[derive(Debug, Clone)]
pub struct FakeCall {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub started: Instant,
}

#[derive(Debug, Clone)]
struct Behaviour {
    exit_code: i32,
    delay: Duration,
    stdout: Vec<String>,
}

/// A fake executor that:
/// - records every execution (path, args, start instant)
/// - "runs" for a configurable delay, honouring cancellation and timeouts
/// - reports a configurable exit code and stdout lines
/// - tracks how many executions overlapped at most
pub struct FakeExecutor {
    behaviour: Mutex<Behaviour>,
    calls: Mutex<Vec<FakeCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            behaviour: Mutex::new(Behaviour {
                exit_code: 0,
                delay: Duration::ZERO,
                stdout: Vec::new(),
            }),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_exit_code(self, code: i32) -> Self {
        self.behaviour.lock().unwrap().exit_code = code;
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.behaviour.lock().unwrap().delay = delay;
        self
    }

    pub fn with_stdout(self, line: &str) -> Self {
        self.behaviour.lock().unwrap().stdout.push(line.to_string());
        self
    }

    pub fn set_exit_code(&self, code: i32) {
        self.behaviour.lock().unwrap().exit_code = code;
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls made with `path`.
    pub fn calls_for(&self, path: &Path) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path == path)
            .count()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptExecutor for FakeExecutor {
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecContext,
        script_path: &'a Path,
        args: &'a [String],
        handler: Arc<dyn LogHandler>,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult> + Send + 'a>> {
        Box::pin(async move {
            let started = Instant::now();
            let timestamp = Utc::now();
            handler.on_start(timestamp);

            let behaviour = self.behaviour.lock().unwrap().clone();
            self.calls.lock().unwrap().push(FakeCall {
                path: script_path.to_path_buf(),
                args: args.to_vec(),
                started,
            });

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            for line in &behaviour.stdout {
                handler.on_line(Utc::now(), OutputStream::Stdout, line);
            }

            let (exit_code, error) = tokio::select! {
                _ = tokio::time::sleep(behaviour.delay) => (behaviour.exit_code, None),
                reason = ctx.done() => (INFRA_EXIT_CODE, Some(reason)),
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let stderr = error
                .as_ref()
                .map(|e| format!("ERROR: {e}"))
                .unwrap_or_default();
            if !stderr.is_empty() {
                handler.on_line(Utc::now(), OutputStream::Stderr, &stderr);
            }

            handler.on_end(Utc::now(), exit_code);

            ExecutionResult {
                exit_code,
                stdout: behaviour.stdout.join("\n").trim().to_string(),
                stderr,
                timestamp,
                duration: started.elapsed(),
                error,
            }
        })
    }
}

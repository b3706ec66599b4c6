// src/engine/runner.rs

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ScriptConfig;
use crate::events::{EventBroadcaster, ScriptStatusEvent};
use crate::exec::{ExecContext, ExecutionResult, LogHandler, ScriptExecutor};
use crate::logs::{LogEntry, LogManager};
use crate::types::OutputStream;

/// Shortest period the ticker accepts.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Why [`ScriptRunner::start`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerExit {
    /// The runner was already started; this call did nothing.
    AlreadyRunning,
    /// Cancelled by the parent token or [`ScriptRunner::stop`].
    Stopped,
    /// A restart was requested; the owner should start a fresh runner with
    /// this configuration.
    Restart(ScriptConfig),
    /// The script was disabled; the owner should drop the runner.
    Retired,
}

/// Change requested while the runner is live, applied when it is next idle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PendingChange {
    #[default]
    None,
    Restart(ScriptConfig),
    Retire,
}

#[derive(Default)]
struct RunnerState {
    running: bool,
    executing: bool,
    token: Option<CancellationToken>,
    pending: PendingChange,
}

/// Owns one script's periodic schedule.
///
/// The loop is strictly serial: it waits for a tick, awaits the whole
/// execution, then waits again. Two executions of the same runner can never
/// overlap, and ticks that elapse mid-run are skipped rather than queued.
pub struct ScriptRunner {
    config: ScriptConfig,
    executor: Arc<dyn ScriptExecutor>,
    logs: Arc<LogManager>,
    events: EventBroadcaster,
    state: Mutex<RunnerState>,
    wake: Notify,
}

impl fmt::Debug for ScriptRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRunner")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("executing", &self.is_executing())
            .finish_non_exhaustive()
    }
}

impl ScriptRunner {
    pub fn new(
        config: ScriptConfig,
        executor: Arc<dyn ScriptExecutor>,
        logs: Arc<LogManager>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            config,
            executor,
            logs,
            events,
            state: Mutex::new(RunnerState::default()),
            wake: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn is_executing(&self) -> bool {
        self.lock().executing
    }

    pub fn pending(&self) -> PendingChange {
        self.lock().pending.clone()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending != PendingChange::None
    }

    /// Run immediately, then once per interval, until cancelled or a pending
    /// change takes effect.
    ///
    /// Calling `start` on a runner that is already started returns
    /// [`RunnerExit::AlreadyRunning`] at once without touching the schedule.
    pub async fn start(&self, parent: &CancellationToken) -> RunnerExit {
        match self.begin(parent) {
            Some(token) => self.run_loop(token).await,
            None => {
                debug!(script = %self.config.name, "runner already started");
                RunnerExit::AlreadyRunning
            }
        }
    }

    /// Mark the runner started and derive its stop token from `parent`.
    /// `None` if it was already started.
    pub(crate) fn begin(&self, parent: &CancellationToken) -> Option<CancellationToken> {
        let mut state = self.lock();
        if state.running {
            return None;
        }
        let token = parent.child_token();
        state.running = true;
        state.token = Some(token.clone());
        Some(token)
    }

    pub(crate) async fn run_loop(&self, token: CancellationToken) -> RunnerExit {
        let _running = RunningGuard(self);

        let period = self.config.interval_duration().max(MIN_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(script = %self.config.name, interval = ?period, "runner started");

        let exit = loop {
            if let Some(exit) = self.take_pending() {
                break exit;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => break RunnerExit::Stopped,
                _ = self.wake.notified() => continue,
                _ = ticker.tick() => {}
            }

            let ctx = ExecContext::new(token.clone());
            self.run_once(&ctx, &[]).await;

            if token.is_cancelled() {
                break RunnerExit::Stopped;
            }
        };

        info!(script = %self.config.name, exit = ?exit, "runner stopped");
        exit
    }

    /// Cancel the schedule and any in-flight execution.
    pub fn stop(&self) {
        if let Some(token) = &self.lock().token {
            token.cancel();
        }
    }

    /// Ask the loop to hand back `config` for a restart. An idle runner
    /// returns right away; an executing one finishes its run first.
    pub fn set_restart_pending(&self, config: ScriptConfig) {
        self.lock().pending = PendingChange::Restart(config);
        self.wake.notify_one();
    }

    /// Ask the loop to exit as [`RunnerExit::Retired`] once idle.
    pub fn set_retire_pending(&self) {
        self.lock().pending = PendingChange::Retire;
        self.wake.notify_one();
    }

    /// Execute the script once, bounded by `ctx` and the configured timeout.
    ///
    /// Publishes `starting` before handing off to the executor and
    /// `completed`/`failed` after the entry is stored. Failures are logged
    /// and returned in the result, never raised.
    pub async fn run_once(&self, ctx: &ExecContext, args: &[String]) -> ExecutionResult {
        let name = &self.config.name;
        let ctx = match self.config.timeout_duration() {
            Some(limit) => ctx.clone().with_timeout(limit),
            None => ctx.clone(),
        };

        let _executing = ExecutingGuard::enter(self);
        self.events.broadcast(&ScriptStatusEvent::starting(name));

        let sink: Arc<dyn LogHandler> = Arc::new(RunSink {
            script_name: name.clone(),
            events: self.events.clone(),
        });
        let result = self
            .executor
            .execute(&ctx, &self.config.path, args, sink)
            .await;

        let logger = self.logs.logger_for(&self.config);
        if let Err(e) = logger.add_entry(LogEntry::from_result(name, &result)) {
            warn!(script = %name, error = %e, "failed to persist log entry");
        }

        match result.check() {
            Ok(()) => info!(
                script = %name,
                duration_ms = result.duration_millis(),
                "script completed"
            ),
            Err(e) => warn!(
                script = %name,
                exit_code = result.exit_code,
                duration_ms = result.duration_millis(),
                error = %e,
                "script failed"
            ),
        }

        self.events.broadcast(&ScriptStatusEvent::finished(
            name,
            result.is_success(),
            result.exit_code,
            result.duration_millis(),
        ));

        result
    }

    fn take_pending(&self) -> Option<RunnerExit> {
        match std::mem::take(&mut self.lock().pending) {
            PendingChange::None => None,
            PendingChange::Restart(config) => Some(RunnerExit::Restart(config)),
            PendingChange::Retire => Some(RunnerExit::Retired),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resets the started state when the loop ends, including when the task
/// driving it is aborted.
struct RunningGuard<'a>(&'a ScriptRunner);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.running = false;
        state.token = None;
        state.pending = PendingChange::None;
    }
}

struct ExecutingGuard<'a>(&'a ScriptRunner);

impl<'a> ExecutingGuard<'a> {
    fn enter(runner: &'a ScriptRunner) -> Self {
        runner.lock().executing = true;
        Self(runner)
    }
}

impl Drop for ExecutingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().executing = false;
    }
}

/// Forwards executor callbacks to the event stream and trace log.
struct RunSink {
    script_name: String,
    events: EventBroadcaster,
}

impl LogHandler for RunSink {
    fn on_start(&self, _timestamp: DateTime<Utc>) {
        self.events
            .broadcast(&ScriptStatusEvent::running(&self.script_name));
    }

    fn on_line(&self, _timestamp: DateTime<Utc>, stream: OutputStream, line: &str) {
        trace!(script = %self.script_name, %stream, line, "output");
    }
}

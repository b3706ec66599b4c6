// src/exec/executor.rs

//! Single-execution process runner.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::ExecError;
use crate::exec::{ExecContext, ExecutionResult, INFRA_EXIT_CODE, LogHandler, ProcessHandle};
use crate::types::OutputStream;

/// How long a terminated group gets to exit after SIGTERM before SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// How long to wait for the output pipes to close once the process is gone.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs one script as its own process group and streams its output.
///
/// Guarantees:
/// - the handler sees `on_start` / `on_end` around every execution, including
///   ones that fail before the process exists;
/// - every output line reaches the handler as it is read, before exit;
/// - on timeout or cancellation the whole group gets SIGTERM, then SIGKILL
///   after the grace period, and the result carries exit code -1;
/// - the returned stdout/stderr are exactly the streamed lines, joined and
///   trimmed.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    grace_period: Duration,
    drain_timeout: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Accumulates streamed lines and forwards each one to the handler.
struct Transcript {
    handler: Arc<dyn LogHandler>,
    stdout: Mutex<Vec<String>>,
    stderr: Mutex<Vec<String>>,
}

impl Transcript {
    fn new(handler: Arc<dyn LogHandler>) -> Self {
        Self {
            handler,
            stdout: Mutex::new(Vec::new()),
            stderr: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, stream: OutputStream, line: &str) {
        self.handler.on_line(Utc::now(), stream, line);
        let lines = match stream {
            OutputStream::Stdout => &self.stdout,
            OutputStream::Stderr => &self.stderr,
        };
        lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }

    fn collected(&self, stream: OutputStream) -> String {
        let lines = match stream {
            OutputStream::Stdout => &self.stdout,
            OutputStream::Stderr => &self.stderr,
        };
        let lines = lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.join("\n").trim().to_string()
    }
}

enum Waited {
    Exited(io::Result<ExitStatus>),
    Interrupted(ExecError),
}

impl ProcessExecutor {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            ..Self::default()
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Execute `script_path` with `args`, bounded by `ctx`.
    ///
    /// Never fails: every error is folded into the returned result with
    /// exit code -1 and a message streamed to the handler on stderr.
    pub async fn execute_with_streaming(
        &self,
        ctx: &ExecContext,
        script_path: &Path,
        args: &[String],
        handler: Arc<dyn LogHandler>,
    ) -> ExecutionResult {
        let started = Instant::now();
        let timestamp = Utc::now();
        handler.on_start(timestamp);

        let transcript = Arc::new(Transcript::new(Arc::clone(&handler)));
        let (exit_code, error) = self.run(ctx, script_path, args, &transcript).await;

        if let Some(err) = &error {
            transcript.push(OutputStream::Stderr, &format!("ERROR: {err}"));
        }

        let result = ExecutionResult {
            exit_code,
            stdout: transcript.collected(OutputStream::Stdout),
            stderr: transcript.collected(OutputStream::Stderr),
            timestamp,
            duration: started.elapsed(),
            error,
        };

        handler.on_end(end_timestamp(timestamp, result.duration), result.exit_code);
        result
    }

    async fn run(
        &self,
        ctx: &ExecContext,
        script_path: &Path,
        args: &[String],
        transcript: &Arc<Transcript>,
    ) -> (i32, Option<ExecError>) {
        if let Some(reason) = ctx.done_reason() {
            return (INFRA_EXIT_CODE, Some(reason));
        }

        let mut cmd = match build_command(script_path, args) {
            Ok(cmd) => cmd,
            Err(e) => return infra(format!("resolving {}: {e}", script_path.display())),
        };

        info!(path = %script_path.display(), ?args, "starting script process");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return infra(format!("starting {}: {e}", script_path.display())),
        };
        let handle = ProcessHandle::from_child(&child);

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            self.terminate(&handle, &mut child).await;
            return infra("creating output pipes".to_string());
        };
        let drains = [
            spawn_drain(stdout, OutputStream::Stdout, Arc::clone(transcript)),
            spawn_drain(stderr, OutputStream::Stderr, Arc::clone(transcript)),
        ];

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            reason = ctx.done() => Waited::Interrupted(reason),
        };

        let outcome = match waited {
            Waited::Exited(Ok(status)) => {
                let code = status.code().unwrap_or(INFRA_EXIT_CODE);
                info!(
                    pid = handle.pid(),
                    exit_code = code,
                    success = status.success(),
                    "script process exited"
                );
                (code, None)
            }
            Waited::Exited(Err(e)) => {
                self.terminate(&handle, &mut child).await;
                (INFRA_EXIT_CODE, Some(ExecError::Infra(format!("waiting for process: {e}"))))
            }
            Waited::Interrupted(reason) => {
                warn!(pid = handle.pid(), reason = %reason, "terminating script process group");
                self.terminate(&handle, &mut child).await;
                (INFRA_EXIT_CODE, Some(reason))
            }
        };

        // Descendants may outlive the leader and keep the pipes open.
        self.reap_group(&handle).await;
        self.join_drains(drains).await;

        outcome
    }

    /// SIGTERM the group, wait up to the grace period for the leader, then
    /// SIGKILL whatever is left.
    async fn terminate(&self, handle: &ProcessHandle, child: &mut Child) {
        if let Err(e) = handle.terminate_gracefully() {
            warn!(pid = handle.pid(), error = %e, "failed to signal process group");
        }

        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(Ok(_)) => debug!(pid = handle.pid(), "process exited after SIGTERM"),
            _ => {
                warn!(
                    pid = handle.pid(),
                    grace_period = ?self.grace_period,
                    "process did not exit after SIGTERM; sending SIGKILL"
                );
                if let Err(e) = handle.kill() {
                    warn!(pid = handle.pid(), error = %e, "failed to kill process group");
                }
                let _ = child.start_kill();
                let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
            }
        }
    }

    /// Clean up group members left behind after the leader is gone.
    async fn reap_group(&self, handle: &ProcessHandle) {
        if !handle.group_alive() {
            return;
        }
        debug!(pid = handle.pid(), "process group still has members; terminating");
        let _ = handle.terminate_gracefully();
        tokio::time::sleep(self.grace_period).await;
        if handle.group_alive() {
            if let Err(e) = handle.kill() {
                warn!(pid = handle.pid(), error = %e, "failed to kill leftover process group");
            }
        }
    }

    async fn join_drains(&self, mut drains: [JoinHandle<()>; 2]) {
        for drain in drains.iter_mut() {
            if tokio::time::timeout(self.drain_timeout, &mut *drain)
                .await
                .is_err()
            {
                warn!("output pipe still open after process exit; abandoning drain");
                drain.abort();
            }
        }
    }
}

fn infra(message: String) -> (i32, Option<ExecError>) {
    (INFRA_EXIT_CODE, Some(ExecError::Infra(message)))
}

fn end_timestamp(start: DateTime<Utc>, elapsed: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(elapsed)
        .ok()
        .and_then(|d| start.checked_add_signed(d))
        .unwrap_or_else(Utc::now)
}

/// Build the command for a script path.
///
/// A bare name (`"backup.sh"`, `"echo"`) is looked up on `PATH`. Anything with
/// a directory component is made absolute and run from its own directory.
fn build_command(script_path: &Path, args: &[String]) -> io::Result<Command> {
    let has_dir = script_path
        .parent()
        .is_some_and(|p| !p.as_os_str().is_empty());

    let (program, workdir): (PathBuf, Option<PathBuf>) = if has_dir {
        let absolute = std::path::absolute(script_path)?;
        let dir = absolute.parent().map(Path::to_path_buf);
        (absolute, dir)
    } else {
        (script_path.to_path_buf(), None)
    };

    let mut cmd = Command::new(&program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    Ok(cmd)
}

fn spawn_drain<R>(pipe: R, stream: OutputStream, transcript: Arc<Transcript>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut segments = BufReader::new(pipe).split(b'\n');
        loop {
            match segments.next_segment().await {
                Ok(Some(segment)) => {
                    let decoded = String::from_utf8_lossy(&segment);
                    let line: &str = &decoded;
                    transcript.push(stream, line.strip_suffix('\r').unwrap_or(line));
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(%stream, error = %e, "output pipe read failed");
                    break;
                }
            }
        }
    })
}

// tests/executor_process.rs
#![cfg(unix)]

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use scriptd::errors::ExecError;
use scriptd::exec::{ExecContext, INFRA_EXIT_CODE, ProcessExecutor};
use scriptd::types::OutputStream;
use scriptd_test_utils::{Recorded, RecordingHandler, init_tracing, with_timeout, write_script};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn streams_lines_before_process_exits() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "slow.sh", "echo first\nsleep 1\necho second\n");

    let handler = Arc::new(RecordingHandler::new());
    let result = with_timeout(ProcessExecutor::default().execute_with_streaming(
        &ExecContext::background(),
        &script,
        &[],
        handler.clone(),
    ))
    .await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "first\nsecond");

    let timed = handler.timed_events();
    let first_at = timed
        .iter()
        .find(|(_, r)| *r == Recorded::Line(OutputStream::Stdout, "first".into()))
        .map(|(t, _)| *t)
        .ok_or("first line never streamed")?;
    let end_at = timed
        .iter()
        .find(|(_, r)| matches!(r, Recorded::End(_)))
        .map(|(t, _)| *t)
        .ok_or("no end notification")?;

    assert!(
        end_at.duration_since(first_at) >= Duration::from_millis(500),
        "first line should arrive well before the process exits"
    );
    Ok(())
}

#[tokio::test]
async fn captures_exit_code_and_both_streams() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = write_script(
        dir.path(),
        "fail.sh",
        "echo out one\necho err one >&2\necho out two\nexit 3\n",
    );

    let handler = Arc::new(RecordingHandler::new());
    let result = with_timeout(ProcessExecutor::default().execute_with_streaming(
        &ExecContext::background(),
        &script,
        &[],
        handler.clone(),
    ))
    .await;

    assert_eq!(result.exit_code, 3);
    assert!(result.error.is_none());
    assert_eq!(result.check(), Err(ExecError::ScriptExit(3)));
    assert_eq!(result.stdout, "out one\nout two");
    assert_eq!(result.stderr, "err one");

    // Batch view equals the streamed view.
    assert_eq!(handler.lines(OutputStream::Stdout).join("\n"), result.stdout);
    assert_eq!(handler.lines(OutputStream::Stderr).join("\n"), result.stderr);

    let events = handler.events();
    assert_eq!(events.first(), Some(&Recorded::Start));
    assert_eq!(events.last(), Some(&Recorded::End(3)));
    Ok(())
}

#[tokio::test]
async fn passes_arguments_and_trims_output() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "args.sh", "echo\necho \"$1-$2\"\necho\n");

    let args = vec!["alpha".to_string(), "beta".to_string()];
    let result = with_timeout(ProcessExecutor::default().execute_with_streaming(
        &ExecContext::background(),
        &script,
        &args,
        Arc::new(RecordingHandler::new()),
    ))
    .await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "alpha-beta");
    Ok(())
}

#[tokio::test]
async fn runs_script_from_its_own_directory() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "where.sh", "pwd -P\n");

    let result = with_timeout(ProcessExecutor::default().execute_with_streaming(
        &ExecContext::background(),
        &script,
        &[],
        Arc::new(RecordingHandler::new()),
    ))
    .await;

    let expected = std::fs::canonicalize(dir.path())?;
    assert_eq!(Path::new(&result.stdout), expected.as_path());
    Ok(())
}

#[tokio::test]
async fn bare_command_is_looked_up_on_path() -> TestResult {
    init_tracing();
    let args = vec!["hello".to_string()];
    let result = with_timeout(ProcessExecutor::default().execute_with_streaming(
        &ExecContext::background(),
        Path::new("echo"),
        &args,
        Arc::new(RecordingHandler::new()),
    ))
    .await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "hello");
    Ok(())
}

#[tokio::test]
async fn missing_command_reports_infra_failure_with_matched_hooks() -> TestResult {
    init_tracing();
    let handler = Arc::new(RecordingHandler::new());
    let result = with_timeout(ProcessExecutor::default().execute_with_streaming(
        &ExecContext::background(),
        Path::new("/definitely/not/here/missing.sh"),
        &[],
        handler.clone(),
    ))
    .await;

    assert_eq!(result.exit_code, INFRA_EXIT_CODE);
    assert!(matches!(result.error, Some(ExecError::Infra(_))));
    assert!(result.stderr.starts_with("ERROR: infrastructure failure"));
    assert_eq!(handler.count_starts(), 1);
    assert_eq!(handler.count_ends(), 1);
    assert_eq!(handler.events().last(), Some(&Recorded::End(INFRA_EXIT_CODE)));
    Ok(())
}

#[tokio::test]
async fn timeout_terminates_with_minus_one() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "hang.sh", "echo started\nsleep 30\necho never\n");

    let ctx = ExecContext::background().with_timeout(Duration::from_millis(500));
    let started = Instant::now();
    let result = with_timeout(ProcessExecutor::default().execute_with_streaming(
        &ctx,
        &script,
        &[],
        Arc::new(RecordingHandler::new()),
    ))
    .await;

    assert_eq!(result.exit_code, INFRA_EXIT_CODE);
    assert_eq!(
        result.error,
        Some(ExecError::Timeout(Duration::from_millis(500)))
    );
    assert_eq!(result.stdout, "started");
    assert!(result.stderr.contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(3));
    Ok(())
}

#[cfg(target_os = "linux")]
fn process_gone(pid: &str) -> bool {
    // Gone, or a zombie waiting to be reaped by its new parent.
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn timeout_kills_the_whole_process_group() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let pid_file = dir.path().join("child.pid");
    let script = write_script(
        dir.path(),
        "spawner.sh",
        &format!(
            "sleep 30 &\necho $! > {}\nwait\n",
            pid_file.display()
        ),
    );

    let ctx = ExecContext::background().with_timeout(Duration::from_secs(1));
    let result = with_timeout(ProcessExecutor::default().execute_with_streaming(
        &ctx,
        &script,
        &[],
        Arc::new(RecordingHandler::new()),
    ))
    .await;
    assert_eq!(result.exit_code, INFRA_EXIT_CODE);

    let pid = std::fs::read_to_string(&pid_file)?.trim().to_string();
    assert!(!pid.is_empty());

    let gone = scriptd_test_utils::wait_until(Duration::from_secs(2), || process_gone(&pid)).await;
    assert!(gone, "background child {pid} survived its group being killed");
    Ok(())
}

#[tokio::test]
async fn cancellation_terminates_running_script() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "hang.sh", "sleep 30\n");

    let token = CancellationToken::new();
    let ctx = ExecContext::new(token.clone());
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            token.cancel();
        })
    };

    let result = with_timeout(ProcessExecutor::default().execute_with_streaming(
        &ctx,
        &script,
        &[],
        Arc::new(RecordingHandler::new()),
    ))
    .await;
    canceller.await?;

    assert_eq!(result.exit_code, INFRA_EXIT_CODE);
    assert_eq!(result.error, Some(ExecError::Cancelled));
    Ok(())
}

#[tokio::test]
async fn already_cancelled_context_never_spawns() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let marker = dir.path().join("ran");
    let script = write_script(
        dir.path(),
        "touch.sh",
        &format!("touch {}\n", marker.display()),
    );

    let token = CancellationToken::new();
    token.cancel();
    let handler = Arc::new(RecordingHandler::new());
    let result = ProcessExecutor::default()
        .execute_with_streaming(&ExecContext::new(token), &script, &[], handler.clone())
        .await;

    assert_eq!(result.exit_code, INFRA_EXIT_CODE);
    assert_eq!(result.error, Some(ExecError::Cancelled));
    assert!(!marker.exists());
    assert_eq!(handler.count_starts(), 1);
    assert_eq!(handler.count_ends(), 1);
    Ok(())
}

#[tokio::test]
async fn no_timeout_lets_script_finish() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "nap.sh", "sleep 1\necho done\n");

    let result = with_timeout(ProcessExecutor::default().execute_with_streaming(
        &ExecContext::background(),
        &script,
        &[],
        Arc::new(RecordingHandler::new()),
    ))
    .await;

    assert!(result.is_success());
    assert_eq!(result.stdout, "done");
    assert!(result.duration >= Duration::from_secs(1));
    Ok(())
}

#[test]
fn earlier_deadline_wins() {
    let ctx = ExecContext::background()
        .with_timeout(Duration::from_secs(1))
        .with_timeout(Duration::from_secs(60));
    assert_eq!(ctx.timeout(), Some(Duration::from_secs(1)));

    let ctx = ExecContext::background()
        .with_timeout(Duration::from_secs(60))
        .with_timeout(Duration::from_secs(1));
    assert_eq!(ctx.timeout(), Some(Duration::from_secs(1)));
}

#[tokio::test]
async fn done_reason_reports_cancellation() {
    let token = CancellationToken::new();
    let ctx = ExecContext::new(token.clone());
    assert!(!ctx.is_done());
    assert_eq!(ctx.done_reason(), None);

    token.cancel();
    assert!(ctx.is_done());
    assert_eq!(ctx.done_reason(), Some(ExecError::Cancelled));
    assert_eq!(ctx.done().await, ExecError::Cancelled);
}

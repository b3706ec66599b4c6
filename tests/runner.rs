// tests/runner.rs
//
// Runner behaviour against the fake executor on a paused clock, so interval
// and timeout arithmetic is deterministic and instant.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use scriptd::config::ScriptConfig;
use scriptd::engine::{PendingChange, RunnerExit, ScriptRunner};
use scriptd::errors::ExecError;
use scriptd::events::{EventBroadcaster, ScriptStatusEvent};
use scriptd::exec::{ExecContext, INFRA_EXIT_CODE};
use scriptd::logs::{LogManager, LogQuery};
use scriptd::types::ScriptStatus;
use scriptd_test_utils::builders::ScriptConfigBuilder;
use scriptd_test_utils::{FakeExecutor, init_tracing, wait_until};

type TestResult = Result<(), Box<dyn Error>>;

struct Harness {
    runner: Arc<ScriptRunner>,
    executor: Arc<FakeExecutor>,
    logs: Arc<LogManager>,
    events: EventBroadcaster,
    _dir: tempfile::TempDir,
}

fn harness(config: ScriptConfig, executor: FakeExecutor) -> Harness {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = Arc::new(executor);
    let logs = Arc::new(LogManager::new(dir.path()));
    let events = EventBroadcaster::new();
    let runner = Arc::new(ScriptRunner::new(
        config,
        executor.clone(),
        logs.clone(),
        events.clone(),
    ));
    Harness {
        runner,
        executor,
        logs,
        events,
        _dir: dir,
    }
}

fn spawn_start(
    runner: &Arc<ScriptRunner>,
    parent: &CancellationToken,
) -> tokio::task::JoinHandle<RunnerExit> {
    let runner = Arc::clone(runner);
    let parent = parent.clone();
    tokio::spawn(async move { runner.start(&parent).await })
}

fn drain(rx: &mut mpsc::Receiver<ScriptStatusEvent>) -> Vec<ScriptStatus> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event.status);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn runs_immediately_then_on_every_tick() -> TestResult {
    let h = harness(
        ScriptConfigBuilder::new("tick", "./tick.sh").interval(10).build(),
        FakeExecutor::new(),
    );
    let parent = CancellationToken::new();
    let task = spawn_start(&h.runner, &parent);

    assert!(wait_until(Duration::from_millis(100), || h.executor.call_count() == 1).await);

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(h.executor.call_count(), 3);

    parent.cancel();
    assert_eq!(task.await?, RunnerExit::Stopped);
    assert!(!h.runner.is_running());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn second_start_is_a_no_op() -> TestResult {
    let h = harness(
        ScriptConfigBuilder::new("once", "./once.sh").interval(60).build(),
        FakeExecutor::new(),
    );
    let parent = CancellationToken::new();
    let task = spawn_start(&h.runner, &parent);
    assert!(wait_until(Duration::from_secs(1), || h.runner.is_running()).await);

    assert_eq!(h.runner.start(&parent).await, RunnerExit::AlreadyRunning);
    assert!(h.runner.is_running());

    h.runner.stop();
    assert_eq!(task.await?, RunnerExit::Stopped);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn executions_never_overlap() -> TestResult {
    let h = harness(
        ScriptConfigBuilder::new("slow", "./slow.sh").interval(1).build(),
        FakeExecutor::new().with_delay(Duration::from_millis(3500)),
    );
    let parent = CancellationToken::new();
    let task = spawn_start(&h.runner, &parent);

    tokio::time::sleep(Duration::from_secs(20)).await;
    parent.cancel();
    task.await?;

    assert_eq!(h.executor.max_in_flight(), 1);
    // Serial runs of 3.5s fit at most six times into 20s.
    let calls = h.executor.call_count();
    assert!((2..=6).contains(&calls), "unexpected call count {calls}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failures_do_not_stop_the_schedule() -> TestResult {
    let h = harness(
        ScriptConfigBuilder::new("flaky", "./flaky.sh").interval(1).build(),
        FakeExecutor::new().with_exit_code(1),
    );
    let parent = CancellationToken::new();
    let task = spawn_start(&h.runner, &parent);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(h.runner.is_running());
    assert!(h.executor.call_count() >= 3);

    let entries = h.logs.query_logs(&LogQuery::for_script("flaky"));
    assert!(entries.len() >= 3);
    assert!(entries.iter().all(|e| e.exit_code == 1));

    parent.cancel();
    assert_eq!(task.await?, RunnerExit::Stopped);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn run_once_publishes_starting_running_then_terminal() -> TestResult {
    let h = harness(
        ScriptConfigBuilder::new("order", "./order.sh").build(),
        FakeExecutor::new().with_stdout("hello"),
    );
    let (tx, mut rx) = mpsc::channel(16);
    let _sub = h.events.subscribe(tx);

    let result = h.runner.run_once(&ExecContext::background(), &[]).await;
    assert!(result.is_success());
    assert_eq!(
        drain(&mut rx),
        vec![
            ScriptStatus::Starting,
            ScriptStatus::Running,
            ScriptStatus::Completed
        ]
    );

    let entries = h.logs.query_logs(&LogQuery::for_script("order"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].stdout, "hello");
    assert!(!h.runner.is_executing());

    h.executor.set_exit_code(4);
    h.runner.run_once(&ExecContext::background(), &[]).await;
    let statuses = drain(&mut rx);
    assert_eq!(statuses.last(), Some(&ScriptStatus::Failed));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn run_once_forwards_arguments() -> TestResult {
    let h = harness(
        ScriptConfigBuilder::new("args", "./args.sh").build(),
        FakeExecutor::new(),
    );
    let args = vec!["--dry-run".to_string()];
    h.runner.run_once(&ExecContext::background(), &args).await;

    let calls = h.executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args, args);
    assert_eq!(calls[0].path, std::path::PathBuf::from("./args.sh"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_yields_minus_one() -> TestResult {
    let h = harness(
        ScriptConfigBuilder::new("stuck", "./stuck.sh").timeout(2).build(),
        FakeExecutor::new().with_delay(Duration::from_secs(60)),
    );
    let (tx, mut rx) = mpsc::channel(16);
    let _sub = h.events.subscribe(tx);

    let started = tokio::time::Instant::now();
    let result = h.runner.run_once(&ExecContext::background(), &[]).await;

    assert_eq!(result.exit_code, INFRA_EXIT_CODE);
    assert_eq!(result.error, Some(ExecError::Timeout(Duration::from_secs(2))));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(drain(&mut rx).last(), Some(&ScriptStatus::Failed));

    let entries = h.logs.query_logs(&LogQuery::for_script("stuck"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].exit_code, INFRA_EXIT_CODE);
    assert!(entries[0].stderr.contains("timed out"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn restart_while_executing_lets_the_run_finish() -> TestResult {
    let h = harness(
        ScriptConfigBuilder::new("busy", "./busy.sh").interval(60).build(),
        FakeExecutor::new().with_delay(Duration::from_secs(5)),
    );
    let parent = CancellationToken::new();
    let task = spawn_start(&h.runner, &parent);
    assert!(wait_until(Duration::from_secs(1), || h.runner.is_executing()).await);

    let next = ScriptConfigBuilder::new("busy", "./busy.sh").interval(5).build();
    h.runner.set_restart_pending(next.clone());
    assert_eq!(h.runner.pending(), PendingChange::Restart(next.clone()));
    assert!(h.runner.is_executing());

    assert_eq!(task.await?, RunnerExit::Restart(next));

    // The in-flight run completed normally rather than being cancelled.
    let entries = h.logs.query_logs(&LogQuery::for_script("busy"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].exit_code, 0);
    assert_eq!(h.executor.call_count(), 1);
    assert_eq!(h.runner.pending(), PendingChange::None);
    assert!(!h.runner.is_running());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn restart_while_idle_returns_promptly() -> TestResult {
    let h = harness(
        ScriptConfigBuilder::new("idle", "./idle.sh").interval(3600).build(),
        FakeExecutor::new(),
    );
    let parent = CancellationToken::new();
    let task = spawn_start(&h.runner, &parent);
    assert!(
        wait_until(Duration::from_secs(1), || {
            h.executor.call_count() == 1 && !h.runner.is_executing()
        })
        .await
    );

    let next = ScriptConfigBuilder::new("idle", "./idle.sh").interval(5).build();
    let started = tokio::time::Instant::now();
    h.runner.set_restart_pending(next.clone());

    assert_eq!(task.await?, RunnerExit::Restart(next));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(h.executor.call_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retire_exits_after_current_run() -> TestResult {
    let h = harness(
        ScriptConfigBuilder::new("old", "./old.sh").interval(60).build(),
        FakeExecutor::new().with_delay(Duration::from_secs(2)),
    );
    let parent = CancellationToken::new();
    let task = spawn_start(&h.runner, &parent);
    assert!(wait_until(Duration::from_secs(1), || h.runner.is_executing()).await);

    h.runner.set_retire_pending();
    assert_eq!(task.await?, RunnerExit::Retired);
    assert_eq!(h.logs.query_logs(&LogQuery::for_script("old"))[0].exit_code, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_the_in_flight_run() -> TestResult {
    let h = harness(
        ScriptConfigBuilder::new("long", "./long.sh").interval(60).build(),
        FakeExecutor::new().with_delay(Duration::from_secs(300)),
    );
    let parent = CancellationToken::new();
    let task = spawn_start(&h.runner, &parent);
    assert!(wait_until(Duration::from_secs(1), || h.runner.is_executing()).await);

    h.runner.stop();
    assert_eq!(task.await?, RunnerExit::Stopped);

    let entries = h.logs.query_logs(&LogQuery::for_script("long"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].exit_code, INFRA_EXIT_CODE);
    assert!(entries[0].stderr.contains("cancelled"));
    assert!(!h.runner.is_running());
    assert!(!h.runner.is_executing());

    // Stopped runners can be started again.
    let again = spawn_start(&h.runner, &parent);
    assert!(wait_until(Duration::from_secs(1), || h.executor.call_count() == 2).await);
    parent.cancel();
    assert_eq!(again.await?, RunnerExit::Stopped);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_before_start_is_harmless() {
    let h = harness(
        ScriptConfigBuilder::new("never", "./never.sh").build(),
        FakeExecutor::new(),
    );
    h.runner.stop();
    assert!(!h.runner.is_running());
    assert_eq!(h.executor.call_count(), 0);
}

// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod logs;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::{AddScriptArgs, CliArgs, Command, LogsArgs};
use crate::config::{ScriptConfig, ServiceConfig, load_and_validate};
use crate::engine::ScriptManager;
use crate::events::{EventBroadcaster, ScriptStatusEvent};
use crate::exec::ProcessExecutor;
use crate::logs::{LogManager, LogQuery};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the log store (with history already on disk)
/// - the process executor and script manager
/// - Ctrl-C handling for the daemon
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone();
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let manager = build_manager(&config_path, cfg)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_daemon(manager).await,
        Command::ListScripts => {
            print_scripts(&manager.get_config());
            Ok(())
        }
        Command::AddScript(add) => {
            manager.add_script(script_from_args(add))?;
            manager.save_config()?;
            Ok(())
        }
        Command::RemoveScript { name } => {
            manager.remove_script(&name).await?;
            manager.save_config()?;
            Ok(())
        }
        Command::EnableScript { name } => {
            manager.enable_script(&name)?;
            manager.save_config()?;
            Ok(())
        }
        Command::DisableScript { name } => {
            manager.disable_script(&name)?;
            manager.save_config()?;
            Ok(())
        }
        Command::RunScript { name } => run_script(&manager, &name).await,
        Command::Logs(query) => print_logs(&manager, query),
        Command::ClearLogs { name } => {
            manager.logs().clear_logs(&name)?;
            println!("cleared logs for {name}");
            Ok(())
        }
    }
}

fn build_manager(config_path: &Path, cfg: ServiceConfig) -> Result<ScriptManager> {
    let logs_dir = resolve_logs_dir(config_path, &cfg.logs_dir);
    let logs = Arc::new(LogManager::new(&logs_dir));

    // Declared scripts first, so their history is replayed into windows of
    // the configured size; discovery only picks up the leftovers.
    for script in &cfg.scripts {
        logs.logger_for(script);
    }
    logs.load_existing()
        .with_context(|| format!("scanning {}", logs_dir.display()))?;

    let executor = Arc::new(ProcessExecutor::default());
    Ok(
        ScriptManager::new(cfg, executor, logs, EventBroadcaster::new())
            .with_config_path(config_path),
    )
}

/// Relative log directories are taken relative to the config file.
fn resolve_logs_dir(config_path: &Path, logs_dir: &Path) -> PathBuf {
    if logs_dir.is_absolute() {
        return logs_dir.to_path_buf();
    }
    config_root_dir(config_path).join(logs_dir)
}

/// Directory holding the config file.
///
/// - If the config path has a non-empty parent (e.g. "etc/Scriptd.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Scriptd.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn run_daemon(manager: ScriptManager) -> Result<()> {
    let (tx, rx) = mpsc::channel::<ScriptStatusEvent>(256);
    let subscription = manager.events().subscribe(tx);
    let forwarder = tokio::spawn(log_events(rx));

    let started = manager.start_all_enabled()?;
    info!(started, "scriptd running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl-C")?;

    info!("shutdown requested");
    manager.shutdown().await;
    subscription.unsubscribe();
    forwarder.abort();
    Ok(())
}

async fn log_events(mut rx: mpsc::Receiver<ScriptStatusEvent>) {
    while let Some(event) = rx.recv().await {
        debug!(
            script = %event.script_name,
            status = %event.status,
            exit_code = event.exit_code,
            duration_ms = event.duration,
            "status event"
        );
    }
}

async fn run_script(manager: &ScriptManager, name: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = manager.run_script_once(&cancel, name).await;
    ctrl_c.abort();

    // The entry is in the log either way; show it.
    if let Some(entry) = manager
        .logs()
        .query_logs(&LogQuery::for_script(name).with_limit(1))
        .pop()
    {
        if !entry.stdout.is_empty() {
            println!("{}", entry.stdout);
        }
        if !entry.stderr.is_empty() {
            eprintln!("{}", entry.stderr);
        }
    }

    outcome.map(|_| ()).map_err(Into::into)
}

fn script_from_args(args: AddScriptArgs) -> ScriptConfig {
    ScriptConfig {
        enabled: !args.disabled,
        interval: args.interval,
        timeout: args.timeout,
        max_log_lines: args.max_log_lines,
        ..ScriptConfig::new(args.name, args.path)
    }
}

fn print_scripts(cfg: &ServiceConfig) {
    if cfg.scripts.is_empty() {
        println!("no scripts configured");
        return;
    }

    println!("scripts ({}):", cfg.scripts.len());
    for script in &cfg.scripts {
        println!("  - {}", script.name);
        println!("      path: {}", script.path.display());
        println!("      interval: {}s", script.interval);
        println!("      enabled: {}", script.enabled);
        println!("      max_log_lines: {}", script.max_log_lines);
        if script.timeout > 0 {
            println!("      timeout: {}s", script.timeout);
        }
    }
}

fn print_logs(manager: &ScriptManager, args: LogsArgs) -> Result<()> {
    let query = LogQuery {
        script_name: args.script,
        start_time: args.since,
        end_time: args.until,
        exit_code: args.exit_code,
        limit: Some(args.limit),
    };

    for entry in manager.logs().query_logs(&query) {
        if args.json {
            println!("{}", serde_json::to_string(&entry)?);
        } else {
            println!(
                "[{}] {} exit={} duration={}ms",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.script_name,
                entry.exit_code,
                entry.duration_ms
            );
            for line in entry.stdout.lines() {
                println!("    {line}");
            }
            for line in entry.stderr.lines() {
                println!("    ! {line}");
            }
        }
    }
    Ok(())
}

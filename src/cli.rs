// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{DEFAULT_INTERVAL_SECS, DEFAULT_MAX_LOG_LINES, parse_duration};

/// Command-line arguments for `scriptd`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scriptd",
    version,
    about = "Run scripts on fixed intervals and keep a durable log of every execution.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the service config (TOML, or JSON for `.json` files).
    ///
    /// Default: `Scriptd.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH", default_value = "Scriptd.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCRIPTD_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Schedule every enabled script and run until Ctrl-C (the default).
    Run,
    /// Print the declared scripts.
    ListScripts,
    /// Declare a new script and save the config.
    AddScript(AddScriptArgs),
    /// Remove a script from the config.
    RemoveScript { name: String },
    /// Mark a script as enabled.
    EnableScript { name: String },
    /// Mark a script as disabled.
    DisableScript { name: String },
    /// Execute a script once and print its output.
    RunScript { name: String },
    /// Print stored log entries.
    Logs(LogsArgs),
    /// Delete the stored log entries of a script.
    ClearLogs { name: String },
}

#[derive(Debug, Clone, Args)]
pub struct AddScriptArgs {
    pub name: String,
    pub path: PathBuf,

    /// Time between runs, e.g. `300`, `30s`, `5m`, `1h`.
    #[arg(long, value_parser = parse_secs, default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval: u64,

    /// Kill the run after this long; `0` means never.
    #[arg(long, value_parser = parse_secs, default_value_t = 0)]
    pub timeout: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_LOG_LINES)]
    pub max_log_lines: usize,

    /// Declare the script disabled.
    #[arg(long)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Args)]
pub struct LogsArgs {
    /// Only entries of this script.
    #[arg(long, value_name = "NAME")]
    pub script: Option<String>,

    /// Only entries with this exit code.
    #[arg(long)]
    pub exit_code: Option<i32>,

    /// Only entries at or after this RFC 3339 timestamp.
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Only entries at or before this RFC 3339 timestamp.
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,

    /// Keep at most this many of the most recent entries.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Print one JSON record per line instead of a summary.
    #[arg(long)]
    pub json: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_secs(s: &str) -> Result<u64, String> {
    parse_duration(s).map(|d| d.as_secs())
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::RetryPolicy;

/// Command-line arguments for `queuedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "queuedag",
    version,
    about = "Run a DAG of steps through a task queue, in priority order.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML).
    ///
    /// Default: `Queuedag.toml` in the current working directory.
    #[arg(long, value_name = "PATH")]
    pub plan: Option<String>,

    /// Execute only these steps (repeatable). Overrides `[run].select`.
    #[arg(long = "select", value_name = "KEY")]
    pub select: Vec<String>,

    /// Override `[executor].tick_ms`.
    #[arg(long, value_name = "MS")]
    pub tick_ms: Option<u64>,

    /// Override `[executor].retries` ("disabled" or "enabled").
    #[arg(long, value_name = "POLICY")]
    pub retries: Option<RetryPolicy>,

    /// Override `[executor].max_retries`.
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `QUEUEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the plan in submission order, but don't run
    /// anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print execution events to stdout as JSON lines.
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

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

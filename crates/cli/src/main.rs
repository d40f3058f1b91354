//! CI Notify CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `cinotify.toml` (or `--config`), apply
//!    environment overrides for secrets, and validate before anything starts.
//! 2. **Wire observability**: configure `tracing-subscriber` with an env
//!    filter, a text or JSON layer, and an OpenTelemetry OTLP exporter when
//!    `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! 3. **Construct infrastructure**: create the `SlackClient`, the
//!    `Deduplicator`, and (for the report) the `GithubClient`, and inject them
//!    into the `notifier::Dispatcher`.
//! 4. **Run a subcommand**:
//!    - `serve`: HTTP receiver for CI jobs.
//!    - `send`: one event from a CI step; warns instead of failing the step.
//!    - `weekly-report`: organization-wide PR activity summary.

mod commands;
mod config;
mod observability;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::{ReportArgs, SendArgs, ServeArgs};
use crate::config::RawConfig;
use crate::observability::LogFormat;

/// Posts CI deploy and pull request notifications to Slack.
#[derive(Debug, Parser)]
#[command(name = "cinotify", version, about)]
struct Cli {
    /// Config file (default: ./cinotify.toml if present).
    #[arg(long, global = true, env = "CINOTIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Receive CI events over HTTP.
    Serve(ServeArgs),
    /// Send a single CI event.
    Send(SendArgs),
    /// Post the weekly pull request report.
    WeeklyReport(ReportArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _telemetry = match observability::init(cli.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "cinotify failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut raw = RawConfig::load(cli.config.as_deref())?;
    raw.apply_env(|var| std::env::var(var).ok());
    let settings = raw.resolve()?;

    match cli.command {
        Command::Serve(args) => commands::serve(settings, args).await.map(|()| ExitCode::SUCCESS),
        Command::Send(args) => commands::send(settings, args).await,
        Command::WeeklyReport(args) => commands::weekly_report(settings, args)
            .await
            .map(|()| ExitCode::SUCCESS),
    }
}

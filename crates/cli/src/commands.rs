//! Subcommand implementations.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use github::GithubClient;
use notifier::report::{aggregate, format_report, report_key, ReportWindow};
use notifier::{
    Deduplicator, DispatchOutcome, Dispatcher, EventReceiver, IngestOutcome, SystemClock, Timestamp,
};
use slack::SlackClient;
use tokio::io::AsyncReadExt;

use crate::config::Settings;

/// How often expired delivery records are dropped while serving.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, clap::Args)]
pub struct ServeArgs {
    /// Address to listen on; overrides `listen` from the config file.
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, clap::Args)]
pub struct SendArgs {
    /// Event kind: `deploy`, `pr_opened`, or `pr_merged`.
    #[arg(long)]
    pub kind: String,

    /// JSON payload file, or `-` for stdin.
    #[arg(long, default_value = "-")]
    pub payload: PathBuf,

    /// Exit non-zero when the event is invalid or delivery fails.
    #[arg(long)]
    pub fail_on_error: bool,
}

#[derive(Debug, clap::Args)]
pub struct ReportArgs {
    /// Organization to report on; overrides `org` / `ORG_NAME`.
    #[arg(long)]
    pub org: Option<String>,

    /// Print the formatted message instead of posting it.
    #[arg(long)]
    pub dry_run: bool,
}

fn build_dispatcher(settings: &Settings) -> anyhow::Result<Dispatcher> {
    let backend = SlackClient::new(settings.slack.clone()).context("creating Slack client")?;
    let clock = Arc::new(SystemClock);
    Ok(Dispatcher::new(
        EventReceiver::new(clock.clone()),
        Deduplicator::new(settings.dedup_window, clock),
        Arc::new(backend),
        settings.channel.clone(),
    ))
}

/// Runs the HTTP receiver until Ctrl-C or SIGTERM.
pub async fn serve(settings: Settings, args: ServeArgs) -> anyhow::Result<()> {
    let dispatcher = Arc::new(build_dispatcher(&settings)?);
    let addr = args.listen.unwrap_or(settings.listen);

    let pruner = tokio::spawn(prune_periodically(dispatcher.deduplicator().clone()));
    let app = listener::router(dispatcher, settings.ingest_token.clone());
    let result = listener::serve(addr, app, listener::shutdown_signal()).await;
    pruner.abort();

    result.context("serving HTTP")?;
    tracing::info!("stopped");
    Ok(())
}

async fn prune_periodically(dedup: Deduplicator) {
    let mut tick = tokio::time::interval(PRUNE_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        let pruned = dedup.prune_expired();
        if pruned > 0 {
            tracing::debug!(pruned, remaining = dedup.len(), "pruned expired delivery records");
        }
    }
}

/// Sends one event from a CI step.
///
/// Problems are reported as a GitHub Actions warning annotation on stdout and
/// only fail the step with `--fail-on-error`.
pub async fn send(settings: Settings, args: SendArgs) -> anyhow::Result<ExitCode> {
    let body = read_payload(&args.payload).await?;
    let dispatcher = build_dispatcher(&settings)?;

    let problem = match dispatcher.ingest(&args.kind, &body).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string(&outcome)?);
            match outcome {
                IngestOutcome::Dispatched(DispatchOutcome::Failed { kind, detail }) => {
                    Some(format!("CI notification was not delivered ({kind}): {detail}"))
                }
                _ => None,
            }
        }
        Err(e) => Some(format!("invalid {} event: {e}", args.kind)),
    };

    let Some(problem) = problem else {
        return Ok(ExitCode::SUCCESS);
    };
    println!("{}", actions_warning(&problem));
    Ok(if args.fail_on_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn read_payload(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut body = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut body)
            .await
            .context("reading payload from stdin")?;
        Ok(body)
    } else {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("reading payload from {}", path.display()))
    }
}

/// Formats a `::warning::` workflow command, escaping the message.
fn actions_warning(message: &str) -> String {
    let escaped = message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A");
    format!("::warning title=cinotify::{escaped}")
}

/// Builds and posts the weekly PR report.
pub async fn weekly_report(settings: Settings, args: ReportArgs) -> anyhow::Result<()> {
    let (github_config, org) = settings.github(args.org.as_deref())?;
    let github = GithubClient::new(github_config).context("creating GitHub client")?;

    let window = ReportWindow::ending_at(Timestamp::now());
    tracing::info!(%org, window = %window.display_kst(), "collecting pull request activity");

    let (created, reviewed) = tokio::try_join!(
        github.search_created(&org, &window),
        github.search_reviewed(&org, &window),
    )
    .context("fetching pull request activity")?;
    let stats = aggregate(&created, &reviewed, &window);
    tracing::info!(
        total_prs = stats.total_prs,
        total_comments = stats.total_comments,
        "aggregated weekly activity"
    );

    let message = format_report(&org, &stats, &window);
    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&message)?);
        return Ok(());
    }

    let dispatcher = build_dispatcher(&settings)?;
    match dispatcher.dispatch_message(report_key(&org, &window), message).await {
        DispatchOutcome::Failed { kind, detail } => {
            anyhow::bail!("weekly report was not delivered ({kind}): {detail}")
        }
        outcome => {
            println!("{}", serde_json::to_string(&outcome)?);
            Ok(())
        }
    }
}

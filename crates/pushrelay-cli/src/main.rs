//! pushrelay - repository event publisher hook
//!
//! Invoked by the Mercurial server as a changegroup/pretxnchangegroup hook.
//! Reads the pushed changeset range (`HG_NODE` through tip), publishes one
//! message per changeset plus a push summary to the configured topic
//! exchange, and translates the run outcome into the hook's exit code.
//!
//! Wiring, `.hg/hgrc`:
//!
//! ```ini
//! [hooks]
//! changegroup.pushrelay = pushrelay --config /etc/pushrelay.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pushrelay_broker::BrokerPublisher;
use pushrelay_domain::{BuilderConfig, MessageBuilder, PushContext};
use pushrelay_hook::{
    ChangesetReader, DriverConfig, HgChangesetReader, HookDriver, HookOutcome,
};

mod settings;

use settings::{HookSettings, Settings};

#[derive(Parser)]
#[command(name = "pushrelay")]
#[command(version)]
#[command(about = "Publish repository push events to a message broker", long_about = None)]
struct Cli {
    /// Path to the TOML settings file
    #[arg(long, env = "PUSHRELAY_CONFIG", default_value = "/etc/pushrelay.toml")]
    config: PathBuf,

    /// Repository the hook fired in (the hook runs with the repository as
    /// its working directory)
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// First new changeset id of the push, provided by Mercurial
    #[arg(long, env = "HG_NODE")]
    node: String,

    /// Origin of the push (serve, push, ...), provided by Mercurial
    #[arg(long, env = "HG_SOURCE")]
    source: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            // Setup problems (unreadable settings) always block: without a
            // policy we cannot know whether the site wants fail-open.
            error!(error = %format!("{e:#}"), "hook aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let settings = Settings::load(&cli.config)?;
    let repo = cli.repo.canonicalize().unwrap_or_else(|_| cli.repo.clone());
    let repository_identifier = settings.hook.repository_identifier(&repo);

    let reader = HgChangesetReader::new(settings.hook.default_branch.clone());
    let changeset_ids = match reader.incoming(&repo, &cli.node).await {
        Ok(ids) => ids,
        Err(e) => {
            return Ok(report_failure(
                &settings.hook,
                &format!("enumerating push: {e}"),
            ))
        }
    };

    info!(
        repository = %repository_identifier,
        changesets = changeset_ids.len(),
        broker = %settings.broker.addr(),
        "publishing push notifications"
    );

    let ctx = PushContext {
        repository_identifier,
        changeset_ids,
        source: cli.source.clone(),
        pushed_at: Utc::now(),
        branch: settings.hook.default_branch.clone(),
    };
    let builder = MessageBuilder::new(BuilderConfig {
        exchange: settings.broker.exchange.clone(),
        use_envelope: settings.hook.use_envelope,
        routing_prefix: settings.hook.routing_prefix.clone(),
    });
    let publisher = BrokerPublisher::for_config(&settings.broker);
    let mut driver = HookDriver::new(
        reader,
        builder,
        publisher,
        DriverConfig {
            send_summary: settings.hook.send_summary,
        },
    );

    match driver.run(&repo, ctx).await {
        HookOutcome::Succeeded { published } => {
            info!(published, "all messages sent");
            Ok(true)
        }
        HookOutcome::Failed { stage, reason } => {
            Ok(report_failure(&settings.hook, &format!("{stage}: {reason}")))
        }
    }
}

/// Apply the site's failure policy: block the push or wave it through.
fn report_failure(hook: &HookSettings, reason: &str) -> bool {
    if hook.fail_on_error {
        error!(%reason, "hook failed, rejecting push");
        false
    } else {
        warn!(%reason, "hook failed, allowing push to continue");
        true
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_env("PUSHRELAY_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

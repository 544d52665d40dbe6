//! Treasury sentinel entrypoint.

use anyhow::{Context, Result};
use clap::Parser;
use sentinel_agent::{build_agent, replay_run};
use sentinel_storage::SentinelStore;
use sentinel_types::SentinelConfig;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sentinel", about = "Advisory monitoring agent for multi-chain EVM treasuries")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Overrides the configured data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Replays a recorded run (dry run, no payments, no writes) and exits.
    #[arg(long, value_name = "RUN_ID")]
    replay: Option<u64>,

    /// Increases log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config =
        SentinelConfig::from_toml_path(&cli.config).context("loading configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    config.validate().context("validating configuration")?;

    if let Some(run_id) = cli.replay {
        let store = SentinelStore::open(&config.data_dir)?;
        let report = replay_run(&store, &config, run_id).await?;
        let rendered = serde_json::to_string_pretty(&serde_json::json!({
            "run_id": report.run_id,
            "matches": report.matches(),
            "original": report.original,
            "replayed": report.replayed,
        }))?;
        println!("{rendered}");
        return Ok(());
    }

    let agent = build_agent(&config).await?;
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "sentinel", "interrupt received; shutting down");
            signal_cancel.cancel();
        }
    });
    agent.scheduler.run(cancel).await?;
    Ok(())
}

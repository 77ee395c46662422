// # -----------------------------
// # crates/cli/src/main.rs
// # -----------------------------
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use farm_taskclaim::config::DEFAULT_SECRET;
use farm_taskclaim::{
    check_and_claim_tasks, spawn_push_pump, GatewayTransport, NetworkEvents, TaskClaimConfig,
    TaskSystem, TracingLog,
};
use tokio::signal;
use tracing::{info, warn};

mod logging;

use logging::init_logging;

#[derive(Parser, Debug)]
#[command(
    name = "farm-taskclaim",
    version,
    about = "Claims finished task rewards for the farm bot",
    long_about = None
)]
struct Cli {
    /// Path to the configuration file (defaults to farmbot.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error, off). Overrides RUST_LOG if set.
    #[arg(long = "log-level", global = true, value_name = "LEVEL")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch for task updates and claim rewards until interrupted (default)
    Run,
    /// Fetch the task list once, claim what is ready, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TaskClaimConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_logging(cli.log_level.as_deref(), &config.logging)?;

    if config.gateway.secret == DEFAULT_SECRET {
        warn!("Using the default gateway secret; set FARMBOT_SECRET for real deployments");
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Check => check(config).await,
    }
}

async fn run(config: TaskClaimConfig) -> Result<()> {
    let transport = Arc::new(
        GatewayTransport::connect(config.gateway.clone())
            .await
            .context("gateway unavailable")?,
    );
    let events = NetworkEvents::new();
    let pump = spawn_push_pump(
        transport.clone(),
        events.clone(),
        config.gateway.poll_interval(),
    );

    let system = TaskSystem::from_config(&config, transport, events, Arc::new(TracingLog))?;
    system.initialize();

    let interrupted = signal::ctrl_c().await;
    info!("Shutting down task claimer");
    system.cleanup();
    pump.abort();
    system.drain().await;

    interrupted.context("failed to listen for Ctrl-C")
}

async fn check(config: TaskClaimConfig) -> Result<()> {
    let transport = Arc::new(
        GatewayTransport::connect(config.gateway.clone())
            .await
            .context("gateway unavailable")?,
    );
    let system = TaskSystem::from_config(
        &config,
        transport,
        NetworkEvents::new(),
        Arc::new(TracingLog),
    )?;

    let report = check_and_claim_tasks(system.orchestrator())
        .await
        .context("task check failed")?;
    info!(
        claimed = report.claimed,
        failed = report.failed,
        skipped = report.skipped,
        "Task check finished"
    );
    Ok(())
}

//! Command-line interface and daemon wiring.
//!
//! Loads configuration, builds the queue adapter, dispatcher, and scheduler,
//! and runs the loop until ctrl-c.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use crate::config::{DaemonConfig, PollMode, DEBUG_INACTIVITY_TIMEOUT};
use crate::dispatch::WorkerDispatcher;
use crate::queue::SqsQueue;
use crate::scheduler::{stdin_trigger, PollScheduler};

/// Local SQS worker dispatcher daemon.
#[derive(Parser)]
#[command(name = "sqsd")]
#[command(about = "Polls an SQS queue and forwards each message to an HTTP worker endpoint")]
#[command(version)]
pub struct Cli {
    /// Debug mode: trigger each batch manually and hold messages for two
    /// hours before redelivery.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Trigger mode (interval, continuous, manual). Overrides SQSD_MODE.
    #[arg(long)]
    pub mode: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, env = "SQSD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Loads configuration, wires the components, and runs the scheduler until
/// a shutdown signal arrives.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let mut config = DaemonConfig::from_env().context("configuration error")?;

    if let Some(mode) = &cli.mode {
        config.mode = PollMode::parse(mode).with_context(|| {
            format!("unknown mode '{mode}', expected interval, continuous, or manual")
        })?;
    }

    if cli.debug {
        config.mode = PollMode::Manual;
        config.inactivity_timeout = DEBUG_INACTIVITY_TIMEOUT;
        info!("Started in debug mode");
        info!("You will have two hours to debug a message before it times out");
    }

    let queue = Arc::new(SqsQueue::connect(&config).await);
    let dispatcher = Arc::new(WorkerDispatcher::new(config.worker_url.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut scheduler = PollScheduler::new(&config, queue, dispatcher, shutdown_rx);
    if config.mode == PollMode::Manual {
        scheduler = scheduler.with_trigger(stdin_trigger());
    }

    let mut scheduler_handle = tokio::spawn(scheduler.run());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            scheduler_handle.await.context("scheduler task panicked")?;
        }
        // The scheduler returns on its own when a manual trigger source closes.
        result = &mut scheduler_handle => {
            result.context("scheduler task panicked")?;
        }
    }

    Ok(())
}

//! Swarm Launcher binary
//!
//! Stands in for the desktop shell: provisions the account, brings up geth
//! and swarm, and stops both on Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! swarm-launcher run --dev
//! swarm-launcher reset
//! swarm-launcher paths
//! swarm-launcher --data-root ~/launcher-data save-config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde_json::json;
use swarm_launcher::logging;
use swarm_launcher::{LauncherConfig, Orchestrator, RuntimeMode};

#[derive(Parser, Debug)]
#[command(name = "swarm-launcher")]
#[command(about = "Launches and supervises the local geth and swarm nodes")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Look up binaries under <project>/bin instead of the packaged resources
    #[arg(long, global = true)]
    dev: bool,

    /// Override the per-user data root
    #[arg(long, global = true)]
    data_root: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set up, start both nodes and stop them on Ctrl-C (default)
    Run,
    /// Create the working directory and node account if missing
    Setup,
    /// Delete all node data and create a fresh account
    Reset,
    /// Print resolved binary and data paths as JSON
    Paths,
    /// Write the effective configuration to the launcher config file
    SaveConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = LauncherConfig::load();
    if args.dev {
        config.runtime_mode = RuntimeMode::Development;
    }
    if let Some(root) = args.data_root {
        config.user_data_root = Some(root);
    }

    let level = args.log_level.parse().unwrap_or(LevelFilter::Info);
    if let Err(e) = logging::init_logger(logging::log_dir(&config.user_data_root()), level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let command = args.command.unwrap_or(Command::Run);
    if let Command::SaveConfig = command {
        config.save().context("Failed to save launcher config")?;
        println!("{}", LauncherConfig::config_path().display());
        return Ok(());
    }

    let orchestrator = Orchestrator::new(config).context("Failed to resolve node binaries")?;

    match command {
        Command::Run => run(&orchestrator).await,
        Command::Setup => orchestrator.setup().await.context("Node setup failed"),
        Command::Reset => orchestrator.reset().await.context("Node reset failed"),
        Command::Paths => {
            let binaries = orchestrator.binaries();
            let report = json!({
                "geth": binaries.geth,
                "swarm": binaries.swarm,
                "paths": orchestrator.paths(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::SaveConfig => Ok(()),
    }
}

/// Application-ready hook followed by window-close hook
async fn run(orchestrator: &Orchestrator) -> Result<()> {
    let started = async {
        orchestrator.setup().await?;
        orchestrator.start().await
    }
    .await;

    if let Err(e) = started {
        log::error!("Failed to start nodes: {}", e);
        if e.is_process_failure() {
            log::error!("See {} for node output", orchestrator.paths().log_file.display());
        }
        orchestrator.stop().await?;
        return Err(e).context("Node startup failed");
    }

    let status = orchestrator.status().await;
    log::info!(
        "Nodes running (geth PID {:?}, swarm PID {:?}), press Ctrl-C to stop",
        status.geth_pid,
        status.swarm_pid
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    log::info!("Shutting down nodes...");
    orchestrator.stop().await?;
    Ok(())
}

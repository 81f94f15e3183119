//! # switchyard
//!
//! Drives the demo component catalog through the orchestrator.
//!
//! ## Commands
//!
//! - `switchyard plan` - print the resolved closure and creation order
//! - `switchyard run` - initialize, start, round-trip a request, print health, clean up

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use switchyard_core::{ComponentId, EventDraft, Orchestrator, OrchestratorBuilder, OrchestratorConfig};

mod demo;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Orchestrator configuration (JSON)
    #[arg(
        short,
        long,
        global = true,
        env = "SWITCHYARD_CONFIG",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Enable only these components (ids or camelCase keys); repeatable
    #[arg(long = "enable", global = true, value_name = "ID")]
    enable: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SWITCHYARD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved closure and creation order
    Plan,

    /// Run the demo system once
    Run {
        /// How long to stay running before cleanup (Ctrl-C ends early)
        #[arg(long, default_value_t = 0)]
        duration_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let orchestrator = build(cli.config.as_deref(), &cli.enable)?;
    match cli.command {
        Commands::Plan => plan(&orchestrator),
        Commands::Run { duration_ms } => run(&orchestrator, Duration::from_millis(duration_ms)).await,
    }
}

fn build(config_path: Option<&std::path::Path>, enable: &[String]) -> Result<Orchestrator> {
    let mut config = match config_path {
        Some(path) => OrchestratorConfig::from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    if !enable.is_empty() {
        config = config.enable_only(enable.iter().cloned());
    }

    let catalog = demo::catalog().context("Failed to define demo catalog")?;
    OrchestratorBuilder::new(catalog)
        .config(config)
        .build()
        .context("Invalid orchestrator configuration")
}

fn plan(orchestrator: &Orchestrator) -> Result<()> {
    let order = orchestrator.creation_order()?;
    let plan = json!({
        "enabled": orchestrator.enabled_components(),
        "closure": orchestrator.resolve_closure(),
        "creationOrder": order,
    });
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn run(orchestrator: &Orchestrator, duration: Duration) -> Result<()> {
    let outcome = drive(orchestrator, duration).await;

    let report = orchestrator.health_check();
    println!("{}", serde_json::to_string_pretty(&report)?);

    let shutdown = orchestrator.shutdown().await.context("Shutdown failed");
    outcome.and(shutdown)
}

async fn drive(orchestrator: &Orchestrator, duration: Duration) -> Result<()> {
    orchestrator
        .initialize()
        .await
        .context("Failed to initialize components")?;
    orchestrator.start().await.context("Failed to start components")?;

    let context_manager = ComponentId::new(demo::CONTEXT_MANAGER);
    if orchestrator.resolve_closure().contains(&context_manager) {
        let answer = orchestrator
            .bus()
            .request(
                demo::CONTEXT_TOPIC,
                EventDraft::new("lookup", "switchyard-cli"),
                Duration::from_secs(2),
            )
            .await
            .context("Context lookup failed")?;
        info!(%answer, "context manager answered");
    } else {
        warn!("context manager not enabled, skipping lookup");
    }

    if !duration.is_zero() {
        info!(?duration, "running");
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("interrupted");
            }
        }
    }
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

//! Kiln CLI - brief-to-site build service
//!
//! Usage:
//!   kiln serve                  Run the HTTP job submission service
//!   kiln run --job <file>       Run one job in the foreground
//!   kiln check-config           Show effective configuration

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kiln_core::{BuildJob, JobId, ServiceConfig};
use kiln_orchestrator::Orchestrator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_CONFIG: &str = "kiln.toml";

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "Turn a brief into a published static site")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ./kiln.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind (overrides config and KILN_BIND)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one job from a JSON request body and print the outcome
    Run {
        /// Job file in the same shape as a POST /api/build body
        #[arg(long, value_name = "FILE")]
        job: PathBuf,
    },

    /// Print the effective configuration and any missing settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => cmd_serve(config, bind).await,
        Commands::Run { job } => cmd_run(config, job).await,
        Commands::CheckConfig => cmd_check_config(config),
    }
}

fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    if let Some(path) = path {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
    }
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG));
    ServiceConfig::load(Some(path))
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

async fn cmd_serve(mut config: ServiceConfig, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    info!("Starting Kiln on {}", config.server.bind);
    kiln_server::serve(Arc::new(config)).await
}

async fn cmd_run(config: ServiceConfig, job_path: PathBuf) -> Result<()> {
    let raw = tokio::fs::read_to_string(&job_path)
        .await
        .with_context(|| format!("Failed to read {}", job_path.display()))?;
    let job: BuildJob = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid job file {}", job_path.display()))?;
    job.validate()?;
    let job = job.sanitized();

    let orchestrator = Orchestrator::from_config(Arc::new(config))?;
    let outcome = orchestrator.run(JobId::new(), job).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if let Some(kind) = outcome.failure_kind() {
        bail!("Job {} failed: {}", outcome.job_id, kind);
    }
    Ok(())
}

fn cmd_check_config(config: ServiceConfig) -> Result<()> {
    let set = |value: &Option<String>| if value.is_some() { "set" } else { "MISSING" };

    println!("Kiln Configuration");
    println!("==================");
    println!("shared_secret:        {}", set(&config.shared_secret));
    println!("llm.base_url:         {}", config.llm.base_url);
    println!("llm.model:            {}", config.llm.model);
    println!("llm.api_token:        {}", set(&config.llm.api_token));
    println!("hosting.api_base:     {}", config.hosting.api_base);
    println!("hosting.token:        {}", set(&config.hosting.token));
    println!(
        "hosting.owner:        {}",
        config.hosting.owner.as_deref().unwrap_or("MISSING")
    );
    println!(
        "deployment timeout:   {}s (poll every {}s)",
        config.deployment.verify_timeout_secs, config.deployment.poll_interval_secs
    );
    println!("attachment limit:     {} bytes", config.attachments.max_bytes);
    println!("notify backoff:       {:?}s", config.notify.backoff_secs);
    println!("server.bind:          {}", config.server.bind);

    config.ensure_ready()?;
    println!("\nReady.");
    Ok(())
}

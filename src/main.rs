//! cf-ddns - Cloudflare DDNS reconciler
//!
//! Reads the configured records, resolves the host's public addresses, and
//! creates or updates Cloudflare A/AAAA records only when they are stale.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cf_ddns::address::HttpAddressLookup;
use cf_ddns::cloudflare::CloudflareClient;
use cf_ddns::config::{Config, Credentials, NameSource};
use cf_ddns::constants::{DEFAULT_BINARY_PATH, DEFAULT_CONFIG_PATH};
use cf_ddns::reconciler::Reconciler;
use cf_ddns::schedule;
use cf_ddns::units::DeploymentPlan;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

//==============================================================================
// Main
//==============================================================================

#[derive(Debug, Parser)]
#[command(name = "cf-ddns")]
#[command(version = VERSION, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one reconciliation cycle and exit (default)
    Run,
    /// Reconcile periodically until SIGTERM
    Watch,
    /// Validate configuration and credentials without touching the network
    Check,
    /// Write systemd service and timer units
    Units {
        /// Directory to write the units into
        #[arg(long)]
        output_dir: PathBuf,
        /// Absolute path of the installed binary
        #[arg(long, default_value = DEFAULT_BINARY_PATH)]
        binary: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load(Some(config_path.clone())).context("Config load failed")?;

    let verbose = args.verbose || config.verbose;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let reconciler = build_reconciler(&config)?;
            schedule::run_once(&reconciler, config.metrics_file.as_deref()).await?;
        }
        Command::Watch => {
            let reconciler = build_reconciler(&config)?;
            schedule::watch(&reconciler, config.schedule, config.metrics_file.as_deref()).await?;
        }
        Command::Check => check(&config)?,
        Command::Units { output_dir, binary } => {
            let config_path = absolute(&config_path)?;
            let plan = DeploymentPlan::from_config(&config, &binary, &config_path)
                .context("Unit rendering failed")?;
            plan.write_to(&output_dir)?;
        }
    }

    Ok(())
}

/// Loads credentials and record names, then wires up the HTTP clients
fn build_reconciler(config: &Config) -> Result<Reconciler> {
    let credentials = Credentials::load(config).context("Credentials load failed")?;
    let records = config
        .resolve_records()
        .context("Record names load failed")?;

    let cf_client = CloudflareClient::new(
        credentials.api_token.as_str(),
        credentials.zone_id.as_str(),
        config.provider_timeout,
    )
    .context("Cloudflare client failed")?;
    let lookup = HttpAddressLookup::new(config.endpoints(), config.lookup_timeout)
        .context("Address lookup client failed")?;

    Ok(Reconciler::new(
        Arc::new(cf_client),
        Arc::new(lookup),
        records,
        config.enabled_families(),
    )
    .with_concurrency(config.max_concurrency)
    .with_redacted(vec![
        credentials.api_token.clone(),
        credentials.zone_id.clone(),
    ]))
}

fn check(config: &Config) -> Result<()> {
    Credentials::load(config).context("Credentials load failed")?;
    let records = config
        .resolve_records()
        .context("Record names load failed")?;

    info!("Credentials: OK");
    for family in config.enabled_families() {
        let url = config.endpoints().remove(&family).unwrap_or_default();
        info!("{} lookup: {}", family, url);
    }
    for (source, record) in config.records.iter().zip(&records) {
        let name = match &source.name {
            NameSource::Literal(name) => name.clone(),
            NameSource::File(path) if record.name.is_empty() => {
                format!("<empty: {}>", path.display())
            }
            NameSource::File(path) => format!("<from {}>", path.display()),
        };
        info!(
            "Record {} {} (TTL: {}, Proxied: {})",
            record.record_type, name, record.ttl, record.proxied
        );
    }
    info!("Configuration OK");
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("Cannot determine current directory")?
        .join(path))
}

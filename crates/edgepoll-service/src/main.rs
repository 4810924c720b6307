//! edgepoll - interval-driven sensor ingestion.
//!
//! Run with: `cargo run -p edgepoll-service`

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use edgepoll_core::{ConfigSource, GroupConfig};
use edgepoll_service::{Config, Runtime, default_config_path};

/// edgepoll - samples sensor groups on remotely configured intervals and
/// uploads timestamped batches.
#[derive(Parser, Debug)]
#[command(name = "edgepoll")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Device identity (overrides config).
    #[arg(long, global = true, env = "EDGEPOLL_DEVICE_ID")]
    device_id: Option<String>,

    /// Site identity (overrides config).
    #[arg(long, global = true, env = "EDGEPOLL_SITE")]
    site: Option<String>,

    /// Backend base URL (overrides config).
    #[arg(long, global = true, env = "EDGEPOLL_BACKEND_URL")]
    backend_url: Option<String>,

    /// Backend API key (overrides config).
    #[arg(long, global = true, env = "EDGEPOLL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion loop in the foreground (default behavior).
    Run,

    /// Run a single tick, print the outcome of each group, and exit.
    Once,

    /// Validate the configuration and show each group's remote config.
    Check,

    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("edgepoll=info".parse()?),
        )
        .init();

    match &args.command {
        Some(Command::Init { force }) => init_config(args.config.clone(), *force),
        Some(Command::Check) => check(load_config(&args)?).await,
        Some(Command::Once) => once(load_config(&args)?).await,
        Some(Command::Run) | None => run(load_config(&args)?).await,
    }
}

/// Load configuration, apply command-line overrides, and validate.
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(device_id) = &args.device_id {
        config.device.device_id = device_id.clone();
    }
    if let Some(site) = &args.site {
        config.device.site = site.clone();
    }
    if let Some(url) = &args.backend_url {
        config.backend.url = url.clone();
    }
    if let Some(key) = &args.api_key {
        config.backend.api_key = Some(key.clone());
    }

    config.validate()?;
    for warning in config.warnings() {
        warn!("{}", warning);
    }
    Ok(config)
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(default_config_path);
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    let runtime = Runtime::build(&config).context("Failed to create backend client")?;

    info!(
        backend = %runtime.backend.base_url(),
        mode = ?runtime.mode,
        "Starting edgepoll"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let stats = runtime.run(shutdown_rx).await;
    for group in &stats {
        info!(
            sensor_type = %group.sensor_type,
            dispatches = group.dispatches,
            uploads_ok = group.uploads_ok,
            uploads_failed = group.uploads_failed,
            read_failures = group.read_failures,
            "Group summary"
        );
    }
    Ok(())
}

async fn once(config: Config) -> anyhow::Result<()> {
    let mut runtime = Runtime::build(&config).context("Failed to create backend client")?;

    for (sensor_type, outcome) in runtime.ingest.tick().await {
        println!("{:<16} {:?}", sensor_type, outcome);
    }
    println!("{}", serde_json::to_string_pretty(runtime.ingest.stats())?);
    Ok(())
}

async fn check(config: Config) -> anyhow::Result<()> {
    let runtime = Runtime::build(&config).context("Failed to create backend client")?;
    println!("Configuration OK");
    println!("  device: {} at {}", config.device.device_id, config.device.site);
    println!("  backend: {}", runtime.backend.base_url());
    println!();

    let mut unreachable = 0;
    for group in &config.groups {
        let result = runtime
            .backend
            .fetch_config(&config.device.device_id, &group.sensor_type)
            .await;

        let verdict = match result {
            Ok(rows) if rows.len() == 1 => match GroupConfig::try_from(rows[0]) {
                Ok(c) if c.enabled => format!("enabled, every {}s", c.interval_seconds()),
                Ok(c) => format!("disabled (interval {}s)", c.interval_seconds()),
                Err(e) => format!("unusable row: {}", e),
            },
            Ok(rows) => format!("skipped: expected 1 config row, found {}", rows.len()),
            Err(e) => {
                unreachable += 1;
                format!("fetch failed: {}", e)
            }
        };
        println!(
            "  {:<16} [{} sensor(s)] {}",
            group.sensor_type,
            group.sensors.len(),
            verdict
        );
    }

    if unreachable > 0 {
        bail!("{} group config(s) could not be fetched", unreachable);
    }
    Ok(())
}

/// Resolve on Ctrl-C, or on SIGTERM where supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, stopping"),
        _ = terminate => info!("Received SIGTERM, stopping"),
    }
}

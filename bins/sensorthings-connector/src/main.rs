use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use stc_connector::{Config, Connector, NAME, VERSION};
use stc_module_api::global_factories;

const DEFAULT_CONFIG: &str = "config.json";

/// SensorThings connector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (JSON). Defaults to `config.json` when present
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory searched for module artifacts (overrides config)
    #[arg(short, long, value_name = "DIR")]
    module_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, source) = load_config(args.config.as_deref())?;

    // Initialize logging
    let level = if args.debug {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    initialize_logging(&level)?;

    info!("Starting {} {}", NAME, VERSION);
    match &source {
        Some(path) => info!("Config file: {}", path.display()),
        None => warn!("No {} found, using default configuration", DEFAULT_CONFIG),
    }

    if let Some(port) = args.port {
        config.connector.port = port;
    }
    if let Some(module_path) = args.module_path {
        config.connector.module_path = Some(module_path);
    }
    config.validate()?;

    stc_modules::register_all(global_factories());

    let connector = Connector::start(config, global_factories()).await?;
    let server = match connector.bind().await {
        Ok(server) => server,
        Err(e) => {
            error!("{:#}", e);
            connector.shutdown().await;
            return Err(e);
        }
    };

    // Set up signal handlers for graceful shutdown
    let shutdown_signal = setup_signal_handlers();

    if let Err(e) = server.run(shutdown_signal).await {
        error!("Control server failed: {}", e);
    }

    info!("Shutting down connector...");
    connector.shutdown().await;
    info!("Connector shut down successfully");

    Ok(())
}

/// Reads the configuration.
///
/// An explicit `--config` file must exist. Without one, `config.json` in the
/// working directory is used when present, otherwise the defaults.
fn load_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG);
            if !fallback.exists() {
                return Ok((Config::default(), None));
            }
            fallback
        }
    };

    let config = Config::load_from_file(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok((config, Some(path)))
}

fn initialize_logging(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    Ok(())
}

async fn setup_signal_handlers() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("Failed to create SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}

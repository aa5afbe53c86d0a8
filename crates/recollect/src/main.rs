//! Recollect daemon - serves a memory store over HTTP

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use recollect::config::Config;
use recollect::error::{RecollectError, Result};
use recollect::gateway;
use recollect::memory::MemoryStore;

/// Recollect - Persistent, searchable, linked memory for AI agents
#[derive(Parser)]
#[command(name = "recollect")]
#[command(about = "A persistent, semantically searchable memory store for AI agents")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server (default command)
    #[command(name = "serve")]
    Serve {
        /// Override the configured listen address
        #[arg(long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None => serve(cli.config, None).await,
        Some(Command::Serve { listen }) => serve(cli.config, listen).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,recollect=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>, listen: Option<String>) -> Result<()> {
    tracing::info!("Starting Recollect daemon");

    let mut config = Config::load(config_path.as_deref())?;
    if let Some(listen) = listen {
        config.server.listen_addr = listen;
    }
    tracing::debug!("Config loaded: {:?}", config);

    if config.storage.persist {
        let data_dir = &config.storage.data_dir;
        std::fs::create_dir_all(data_dir).map_err(|e| {
            RecollectError::Storage(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;
    }

    tracing::info!("Initializing capability gateway ({})", config.gateway.provider);
    let gateway = gateway::from_config(&config.gateway)
        .map_err(|e| RecollectError::Config(format!("Gateway setup failed: {e}")))?;
    if !gateway.is_available().await {
        tracing::warn!(
            "Capability gateway '{}' is unavailable; store and search will fail until it is",
            gateway.name()
        );
    }

    let store = Arc::new(MemoryStore::open(&config, gateway).await?);
    tracing::info!("Store ready with {} memories", store.len().await);

    recollect::server::serve(&config.server, store).await?;

    tracing::info!("Recollect daemon stopped");
    Ok(())
}

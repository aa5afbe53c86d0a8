use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use recollect::config::Config;
use recollect_cli::commands::{
    GraphCommand, InsightCommand, MaintenanceCommand, MemoryCommand, SearchCommand, StatsCommand,
    open_store,
};
use recollect_cli::error::CliResult;
use recollect_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "recollect-cli")]
#[command(about = "Recollect CLI - Management tool for a recollect memory store")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Memory management commands")]
    Memory(MemoryCommand),

    #[clap(about = "Semantic search over memories")]
    Search(SearchCommand),

    #[clap(about = "Relationship graph and consolidation commands")]
    Graph(GraphCommand),

    #[clap(about = "Model-backed categorization, validation and reflection")]
    Insight(InsightCommand),

    #[clap(about = "Decay, expiration and journal compaction")]
    Maintenance(MaintenanceCommand),

    #[clap(about = "Show store statistics")]
    Stats(StatsCommand),
}

impl Command {
    fn needs_gateway(&self) -> bool {
        match self {
            Command::Memory(cmd) => cmd.needs_gateway(),
            Command::Graph(cmd) => cmd.needs_gateway(),
            Command::Search(_) | Command::Insight(_) => true,
            Command::Maintenance(_) | Command::Stats(_) => false,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run() -> CliResult<()> {
    init_logging();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir.clone() {
        config.storage.data_dir = data_dir;
    }

    let store = open_store(&config, cli.command.needs_gateway()).await?;

    match &cli.command {
        Command::Memory(cmd) => cmd.execute(&store, format).await,
        Command::Search(cmd) => cmd.execute(&store, format).await,
        Command::Graph(cmd) => cmd.execute(&store, format).await,
        Command::Insight(cmd) => cmd.execute(&store, format).await,
        Command::Maintenance(cmd) => cmd.execute(&store, format).await,
        Command::Stats(cmd) => cmd.execute(&store, format).await,
    }
}

/// Logs go to stderr so JSON output stays parseable
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

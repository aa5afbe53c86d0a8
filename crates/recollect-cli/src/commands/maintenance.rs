use clap::{Parser, Subcommand};
use recollect::config::DecayConfig;
use recollect::memory::MemoryStore;

use crate::error::CliResult;
use crate::output::{OutputFormat, print_json};

#[derive(Parser)]
pub struct MaintenanceCommand {
    #[clap(subcommand)]
    pub command: MaintenanceSubcommand,
}

#[derive(Subcommand)]
pub enum MaintenanceSubcommand {
    #[clap(about = "Lower the importance of old memories")]
    Decay(DecayArgs),

    #[clap(about = "Archive memories whose expiry has passed")]
    Expire,

    #[clap(about = "Rewrite the journal as a minimal snapshot")]
    Compact,
}

#[derive(Parser)]
pub struct DecayArgs {
    #[clap(long, help = "Only decay memories older than this many days")]
    pub age_days: Option<i64>,

    #[clap(long, help = "Multiplier applied to importance (0.0 to 1.0)")]
    pub factor: Option<f64>,

    #[clap(long, help = "Importance floor")]
    pub min_importance: Option<u8>,

    #[clap(long, help = "Do not archive memories that reach the floor")]
    pub no_archive: bool,
}

impl DecayArgs {
    fn resolve(&self, defaults: &DecayConfig) -> DecayConfig {
        DecayConfig {
            age_threshold_days: self.age_days.unwrap_or(defaults.age_threshold_days),
            decay_factor: self.factor.unwrap_or(defaults.decay_factor),
            min_importance: self.min_importance.unwrap_or(defaults.min_importance),
            archive_decayed: defaults.archive_decayed && !self.no_archive,
        }
    }
}

impl MaintenanceCommand {
    pub async fn execute(&self, store: &MemoryStore, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            MaintenanceSubcommand::Decay(args) => {
                let config = args.resolve(&store.settings().decay);
                let report = store.decay(&config).await?;
                match format {
                    OutputFormat::Json => print_json(&report)?,
                    OutputFormat::Table => {
                        println!("Decay complete");
                        println!("  Decayed:  {}", report.decayed_count);
                        println!("  Archived: {}", report.archived_count);
                        println!(
                            "  Average importance: {:.2} -> {:.2}",
                            report.avg_importance_before, report.avg_importance_after
                        );
                    }
                }
            }
            MaintenanceSubcommand::Expire => {
                let count = store.archive_expired().await?;
                match format {
                    OutputFormat::Json => print_json(&serde_json::json!({ "archived": count }))?,
                    OutputFormat::Table => println!("Archived {count} expired memories"),
                }
            }
            MaintenanceSubcommand::Compact => {
                let entries = store.compact().await?;
                match format {
                    OutputFormat::Json => print_json(&serde_json::json!({ "entries": entries }))?,
                    OutputFormat::Table => println!("Journal compacted to {entries} entries"),
                }
            }
        }
        Ok(())
    }
}

use clap::{Parser, Subcommand};
use recollect::memory::MemoryStore;

use crate::commands::{parse_id, parse_ids};
use crate::commands::memory::join;
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json};

/// Commands backed by the capability gateway's reasoning model
#[derive(Parser)]
pub struct InsightCommand {
    #[clap(subcommand)]
    pub command: InsightSubcommand,
}

#[derive(Subcommand)]
pub enum InsightSubcommand {
    #[clap(about = "Add model-suggested categories to memories")]
    Categorize(CategorizeArgs),

    #[clap(about = "Check whether a memory still holds")]
    Validate(ValidateArgs),

    #[clap(about = "Derive insights across memories")]
    Reflect(ReflectArgs),
}

#[derive(Parser)]
pub struct CategorizeArgs {
    #[clap(help = "Memory IDs (UUID format)", required = true)]
    pub ids: Vec<String>,
}

#[derive(Parser)]
pub struct ValidateArgs {
    #[clap(help = "Memory ID (UUID format)")]
    pub id: String,

    #[clap(long, help = "Context to validate against")]
    pub context: Option<String>,
}

#[derive(Parser)]
pub struct ReflectArgs {
    #[clap(help = "Memory IDs (UUID format)", required = true)]
    pub ids: Vec<String>,

    #[clap(long, help = "Focus for the reflection")]
    pub context: Option<String>,
}

impl InsightCommand {
    pub async fn execute(&self, store: &MemoryStore, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            InsightSubcommand::Categorize(args) => {
                let categories = store.categorize(&parse_ids(&args.ids)?).await?;
                match format {
                    OutputFormat::Json => print_json(&categories)?,
                    OutputFormat::Table => {
                        let mut table = new_table(["ID", "Categories"]);
                        for (id, set) in &categories {
                            table.add_row([id.to_string(), join(set)]);
                        }
                        println!("{table}");
                    }
                }
            }
            InsightSubcommand::Validate(args) => {
                let validation = store
                    .validate(parse_id(&args.id)?, args.context.as_deref())
                    .await?;
                match format {
                    OutputFormat::Json => print_json(&validation)?,
                    OutputFormat::Table => {
                        println!(
                            "{} (confidence {:.2})",
                            if validation.is_valid { "Valid" } else { "Invalid" },
                            validation.confidence
                        );
                        println!("Reason: {}", validation.reason);
                        if let Some(update) = &validation.suggested_update {
                            println!("Suggested update: {update}");
                        }
                    }
                }
            }
            InsightSubcommand::Reflect(args) => {
                let insights = store
                    .reflect(&parse_ids(&args.ids)?, args.context.as_deref())
                    .await?;
                match format {
                    OutputFormat::Json => print_json(&insights)?,
                    OutputFormat::Table if insights.is_empty() => println!("No insights."),
                    OutputFormat::Table => {
                        for insight in &insights {
                            println!("- {insight}");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

use clap::Parser;
use recollect::memory::{MemoryStore, saturating_days};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_size, format_timestamp, new_table, print_json};

#[derive(Parser)]
pub struct StatsCommand {
    #[clap(long, help = "Window in days for the \"expiring soon\" count")]
    pub horizon_days: Option<i64>,
}

impl StatsCommand {
    pub async fn execute(&self, store: &MemoryStore, format: OutputFormat) -> CliResult<()> {
        let stats = store
            .stats(self.horizon_days.map(saturating_days))
            .await?;

        match format {
            OutputFormat::Json => print_json(&stats)?,
            OutputFormat::Table => {
                println!("Recollect Statistics");
                println!("======================\n");

                let mut table = new_table(["State", "Count"]);
                table.add_row(["Active", &stats.active.to_string()]);
                table.add_row(["Archived", &stats.archived.to_string()]);
                table.add_row(["Expired", &stats.expired.to_string()]);
                table.add_row(["Expiring soon", &stats.expiring_soon.to_string()]);
                table.add_row(["Links", &stats.links.to_string()]);
                println!("{table}\n");

                if !stats.categories.is_empty() {
                    let mut table = new_table(["Category", "Memories"]);
                    for (category, count) in &stats.categories {
                        table.add_row([category.clone(), count.to_string()]);
                    }
                    println!("{table}\n");
                }

                let importance: Vec<String> = stats
                    .importance
                    .iter()
                    .map(|(level, count)| format!("{level}:{count}"))
                    .collect();
                if !importance.is_empty() {
                    println!("Importance: {}", importance.join("  "));
                }

                println!(
                    "Total: {} memories ({} estimated)",
                    stats.total,
                    format_size(stats.approximate_size_bytes)
                );
                if let Some(last) = &stats.last_updated {
                    println!("Last updated: {}", format_timestamp(last));
                }
            }
        }
        Ok(())
    }
}

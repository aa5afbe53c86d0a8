use clap::Parser;
use recollect::memory::{MemoryStore, SearchQuery};
use recollect::storage::MemoryFilter;

use crate::commands::memory::memory_json;
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct SearchCommand {
    #[clap(help = "Query text")]
    pub query: String,

    #[clap(long, short, default_value = "10", help = "Maximum number of results")]
    pub limit: usize,

    #[clap(long, help = "Minimum similarity score (-1.0 to 1.0)")]
    pub min_relevance: Option<f32>,

    #[clap(long, help = "Only memories in this category")]
    pub category: Option<String>,

    #[clap(long, help = "Include archived and expired memories")]
    pub archived: bool,
}

impl SearchCommand {
    pub async fn execute(&self, store: &MemoryStore, format: OutputFormat) -> CliResult<()> {
        let mut query = SearchQuery::text(self.query.clone())
            .with_limit(self.limit)
            .include_archived(self.archived);
        if let Some(min_relevance) = self.min_relevance {
            query = query.with_min_relevance(min_relevance);
        }
        if let Some(category) = &self.category {
            query = query.with_filter(MemoryFilter::new().with_category(category.clone()));
        }

        let hits = store.search(query).await?;

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = hits
                    .iter()
                    .map(|hit| {
                        let mut value = memory_json(&hit.memory);
                        value["score"] = serde_json::json!(hit.score);
                        value
                    })
                    .collect();
                print_json(&output)?;
            }
            OutputFormat::Table => {
                if hits.is_empty() {
                    println!("No matching memories.");
                    return Ok(());
                }

                let mut table = new_table(["Score", "ID", "Content", "Importance"]);
                for hit in &hits {
                    table.add_row([
                        format!("{:.3}", hit.score),
                        truncate_string(&hit.memory.id.to_string(), 8),
                        truncate_string(&hit.memory.content, 60),
                        hit.memory.importance.to_string(),
                    ]);
                }
                println!("{table}");
            }
        }

        Ok(())
    }
}

use clap::{Parser, Subcommand};
use recollect::memory::{ConsolidateRequest, MemoryStore, Relationship};

use crate::commands::{parse_id, parse_ids};
use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct GraphCommand {
    #[clap(subcommand)]
    pub command: GraphSubcommand,
}

#[derive(Subcommand)]
pub enum GraphSubcommand {
    #[clap(about = "Link memories in order: first-second, second-third, ...")]
    Link(LinkArgs),

    #[clap(about = "Show memories reachable from a memory")]
    Related(RelatedArgs),

    #[clap(about = "Merge memories into a new one and rewire their links")]
    Consolidate(ConsolidateArgs),
}

#[derive(Parser)]
pub struct LinkArgs {
    #[clap(help = "Memory IDs to link (at least two)", required = true, num_args = 2..)]
    pub ids: Vec<String>,

    #[clap(long, short, default_value = "related", help = "Relationship label")]
    pub relationship: String,

    #[clap(long, help = "Only link forward (no reverse edges)")]
    pub directed: bool,
}

#[derive(Parser)]
pub struct RelatedArgs {
    #[clap(help = "Memory ID (UUID format)")]
    pub id: String,

    #[clap(long, default_value = "1", help = "Maximum hops")]
    pub depth: u32,

    #[clap(long = "relationship", short, help = "Only follow this relationship (repeatable)")]
    pub relationships: Vec<String>,

    #[clap(long, help = "Traverse through archived and expired memories")]
    pub archived: bool,
}

#[derive(Parser)]
pub struct ConsolidateArgs {
    #[clap(help = "Memory IDs to merge (at least two)", required = true, num_args = 2..)]
    pub ids: Vec<String>,

    #[clap(long, help = "Content of the merged memory")]
    pub content: String,

    #[clap(long, short, help = "Importance (defaults to the highest source)")]
    pub importance: Option<u8>,

    #[clap(long, help = "Archive the sources instead of deleting them")]
    pub keep_originals: bool,
}

impl GraphCommand {
    pub fn needs_gateway(&self) -> bool {
        matches!(self.command, GraphSubcommand::Consolidate(_))
    }

    pub async fn execute(&self, store: &MemoryStore, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            GraphSubcommand::Link(args) => Self::link(store, args, format).await,
            GraphSubcommand::Related(args) => Self::related(store, args, format).await,
            GraphSubcommand::Consolidate(args) => Self::consolidate(store, args, format).await,
        }
    }

    async fn link(store: &MemoryStore, args: &LinkArgs, format: OutputFormat) -> CliResult<()> {
        let ids = parse_ids(&args.ids)?;
        let relationship = Relationship::from(args.relationship.as_str());
        let changed = store.link(&ids, relationship.clone(), !args.directed).await?;

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "changed": changed }))?,
            OutputFormat::Table if changed => {
                println!("Linked {} memories ({relationship})", ids.len())
            }
            OutputFormat::Table => println!("Links already present"),
        }
        Ok(())
    }

    async fn related(
        store: &MemoryStore,
        args: &RelatedArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let id = parse_id(&args.id)?;
        let filter: Vec<Relationship> = args
            .relationships
            .iter()
            .map(|r| Relationship::from(r.as_str()))
            .collect();
        let filter = (!filter.is_empty()).then_some(filter);

        let related = store
            .related_memories(id, args.depth, filter.as_deref(), args.archived)
            .await?;

        match format {
            OutputFormat::Json => print_json(&related)?,
            OutputFormat::Table => {
                if related.is_empty() {
                    println!("No related memories.");
                    return Ok(());
                }

                let mut table = new_table(["Depth", "Relationship", "ID", "Content"]);
                for entry in &related {
                    let content = store
                        .get(entry.id, true)
                        .await
                        .map(|m| truncate_string(&m.content, 50))
                        .unwrap_or_default();
                    table.add_row([
                        entry.depth.to_string(),
                        entry.relationship.to_string(),
                        entry.id.to_string(),
                        content,
                    ]);
                }
                println!("{table}");
            }
        }
        Ok(())
    }

    async fn consolidate(
        store: &MemoryStore,
        args: &ConsolidateArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let mut request = ConsolidateRequest::new(parse_ids(&args.ids)?, args.content.clone());
        if let Some(importance) = args.importance {
            request = request.with_importance(importance);
        }
        if args.keep_originals {
            request = request.keep_originals();
        }

        let id = store.consolidate(request).await?;

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "id": id }))?,
            OutputFormat::Table => println!(
                "Consolidated {} memories into {id} (originals {})",
                args.ids.len(),
                if args.keep_originals { "archived" } else { "deleted" }
            ),
        }
        Ok(())
    }
}

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use recollect::memory::{Memory, MemoryStore, MemoryUpdate, Metadata, NewMemory};
use recollect::storage::MemoryFilter;

use crate::commands::{parse_id, parse_ids};
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, format_timestamp, new_table, print_json, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "List memories, newest first")]
    List(ListArgs),

    #[clap(about = "Show memory details")]
    Show(ShowArgs),

    #[clap(about = "Manually add a memory")]
    Add(AddArgs),

    #[clap(about = "Update a memory's content or importance")]
    Update(UpdateArgs),

    #[clap(about = "Delete a memory, or every memory in a category")]
    Delete(DeleteArgs),

    #[clap(about = "Archive memories (reversible)")]
    Archive(IdsArgs),

    #[clap(about = "Restore archived memories")]
    Restore(IdsArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of memories to display"
    )]
    pub limit: usize,

    #[clap(long, default_value = "0", help = "Number of memories to skip")]
    pub offset: usize,

    #[clap(long, help = "Only memories in this category")]
    pub category: Option<String>,

    #[clap(long, help = "Include archived and expired memories")]
    pub archived: bool,
}

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(help = "Memory ID (UUID format)")]
    pub id: String,
}

#[derive(Parser)]
pub struct AddArgs {
    #[clap(help = "Memory content text")]
    pub text: String,

    #[clap(long, short, default_value = "1", help = "Importance from 1 to 10")]
    pub importance: u8,

    #[clap(long = "category", help = "Category (repeatable)")]
    pub categories: Vec<String>,

    #[clap(long, help = "Metadata as a JSON object")]
    pub metadata: Option<String>,

    #[clap(long, help = "Expire after this many days")]
    pub expires_in_days: Option<i64>,
}

#[derive(Parser)]
pub struct UpdateArgs {
    #[clap(help = "Memory ID (UUID format)")]
    pub id: String,

    #[clap(long, help = "New content (re-embedded)")]
    pub content: Option<String>,

    #[clap(long, short, help = "New importance from 1 to 10")]
    pub importance: Option<u8>,

    #[clap(long, help = "Metadata to merge, as a JSON object")]
    pub metadata: Option<String>,
}

#[derive(Parser)]
pub struct DeleteArgs {
    #[clap(help = "Memory ID to delete (UUID format)", required_unless_present = "category")]
    pub id: Option<String>,

    #[clap(long, help = "Delete every memory in this category", conflicts_with = "id")]
    pub category: Option<String>,
}

#[derive(Parser)]
pub struct IdsArgs {
    #[clap(help = "Memory IDs (UUID format)", required = true)]
    pub ids: Vec<String>,
}

impl MemoryCommand {
    /// Whether the command needs a capability gateway
    pub fn needs_gateway(&self) -> bool {
        match &self.command {
            MemorySubcommand::Add(_) => true,
            MemorySubcommand::Update(args) => args.content.is_some(),
            _ => false,
        }
    }

    pub async fn execute(&self, store: &MemoryStore, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            MemorySubcommand::List(args) => Self::list(store, args, format).await,
            MemorySubcommand::Show(args) => Self::show(store, args, format).await,
            MemorySubcommand::Add(args) => Self::add(store, args, format).await,
            MemorySubcommand::Update(args) => Self::update(store, args, format).await,
            MemorySubcommand::Delete(args) => Self::delete(store, args, format).await,
            MemorySubcommand::Archive(args) => Self::set_archived(store, args, true, format).await,
            MemorySubcommand::Restore(args) => Self::set_archived(store, args, false, format).await,
        }
    }

    async fn list(store: &MemoryStore, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let filter = match &args.category {
            Some(category) => MemoryFilter::new().with_category(category.clone()),
            None => MemoryFilter::new(),
        };
        let memories = store
            .list(&filter, args.archived, Some(args.limit), args.offset)
            .await?;

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = memories.iter().map(memory_json).collect();
                print_json(&output)?;
            }
            OutputFormat::Table => {
                if memories.is_empty() {
                    println!("No memories found.");
                    return Ok(());
                }

                let mut table = new_table([
                    "ID",
                    "Content",
                    "Importance",
                    "Categories",
                    "Created",
                    "State",
                ]);
                for memory in &memories {
                    table.add_row([
                        truncate_string(&memory.id.to_string(), 8),
                        truncate_string(&memory.content, 50),
                        memory.importance.to_string(),
                        join(&memory.categories),
                        format_timestamp(&memory.created_at),
                        state(memory).to_string(),
                    ]);
                }

                println!("{table}");
                println!("\nShown: {} memories", memories.len());
            }
        }

        Ok(())
    }

    async fn show(store: &MemoryStore, args: &ShowArgs, format: OutputFormat) -> CliResult<()> {
        let id = parse_id(&args.id)?;
        let memory = store.get(id, true).await?;
        let links = store.links_of(id).await?;

        match format {
            OutputFormat::Json => {
                let mut output = memory_json(&memory);
                output["links"] = serde_json::to_value(&links)?;
                print_json(&output)?;
            }
            OutputFormat::Table => {
                println!("Memory {}", memory.id);
                println!("==========================================\n");
                println!("Content:    {}", memory.content);
                println!("Importance: {}", memory.importance);
                println!("Categories: {}", join(&memory.categories));
                println!("State:      {}", state(&memory));
                println!("Created:    {}", format_timestamp(&memory.created_at));
                println!("Updated:    {}", format_timestamp(&memory.updated_at));
                if let Some(expires_at) = &memory.expires_at {
                    println!("Expires:    {}", format_timestamp(expires_at));
                }
                if !memory.metadata.is_empty() {
                    println!(
                        "Metadata:   {}",
                        serde_json::to_string_pretty(&memory.metadata)?
                    );
                }
                if !links.is_empty() {
                    println!("\nLinks:");
                    for link in &links {
                        let arrow = if link.bidirectional { "<->" } else { "->" };
                        println!(
                            "  {} {arrow} {} ({})",
                            link.source_id, link.target_id, link.relationship
                        );
                    }
                }
            }
        }

        Ok(())
    }

    async fn add(store: &MemoryStore, args: &AddArgs, format: OutputFormat) -> CliResult<()> {
        let mut request = NewMemory::new(args.text.clone())
            .with_importance(args.importance)
            .with_categories(args.categories.iter().cloned());
        if let Some(metadata) = &args.metadata {
            request = request.with_metadata(parse_metadata(metadata)?);
        }
        if let Some(days) = args.expires_in_days {
            request = request.expires_at(expiry_after_days(Utc::now(), days)?);
        }

        let id = store.store(request).await?;

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "id": id }))?,
            OutputFormat::Table => println!("Stored memory {id}"),
        }
        Ok(())
    }

    async fn update(store: &MemoryStore, args: &UpdateArgs, format: OutputFormat) -> CliResult<()> {
        let id = parse_id(&args.id)?;
        let mut update = MemoryUpdate::new();
        if let Some(content) = &args.content {
            update = update.content(content.clone());
        }
        if let Some(importance) = args.importance {
            update = update.importance(importance);
        }
        if let Some(metadata) = &args.metadata {
            update = update.metadata(parse_metadata(metadata)?);
        }

        let updated = store.update(id, update).await?;

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "id": id, "updated": updated }))?,
            OutputFormat::Table if updated => println!("Updated memory {id}"),
            OutputFormat::Table => println!("Nothing to update"),
        }
        Ok(())
    }

    async fn delete(store: &MemoryStore, args: &DeleteArgs, format: OutputFormat) -> CliResult<()> {
        let id = args.id.as_deref().map(parse_id).transpose()?;
        let filter = match &args.category {
            Some(category) => MemoryFilter::new().with_category(category.clone()),
            None => MemoryFilter::new(),
        };

        let count = store.delete(id, &filter).await?;

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "deleted": count }))?,
            OutputFormat::Table => println!("Deleted {count} memories"),
        }
        Ok(())
    }

    async fn set_archived(
        store: &MemoryStore,
        args: &IdsArgs,
        archived: bool,
        format: OutputFormat,
    ) -> CliResult<()> {
        let ids = parse_ids(&args.ids)?;
        let count = if archived {
            store.archive(&ids).await?
        } else {
            store.restore(&ids).await?
        };

        let action = if archived { "archived" } else { "restored" };
        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ action: count }))?,
            OutputFormat::Table => println!("{count} memories {action}"),
        }
        Ok(())
    }
}

pub(crate) fn memory_json(memory: &Memory) -> serde_json::Value {
    serde_json::json!({
        "id": memory.id.to_string(),
        "content": &memory.content,
        "importance": memory.importance,
        "categories": &memory.categories,
        "metadata": &memory.metadata,
        "archived": memory.archived,
        "created_at": memory.created_at.to_rfc3339(),
        "updated_at": memory.updated_at.to_rfc3339(),
        "expires_at": memory.expires_at.map(|at| at.to_rfc3339()),
    })
}

pub(crate) fn join(categories: &BTreeSet<String>) -> String {
    categories.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn state(memory: &Memory) -> &'static str {
    if memory.archived {
        "archived"
    } else if memory.is_expired_at(Utc::now()) {
        "expired"
    } else {
        "active"
    }
}

fn parse_metadata(raw: &str) -> CliResult<Metadata> {
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(CliError::usage("Metadata must be a JSON object")),
    }
}

fn expiry_after_days(now: DateTime<Utc>, days: i64) -> CliResult<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|span| now.checked_add_signed(span))
        .ok_or_else(|| CliError::usage(format!("--expires-in-days {days} is out of range")))
}

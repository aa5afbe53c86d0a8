pub mod commands;
pub mod error;
pub mod output;

pub use commands::{
    GraphCommand, InsightCommand, MaintenanceCommand, MemoryCommand, SearchCommand, StatsCommand,
};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_size, format_timestamp, truncate_string};

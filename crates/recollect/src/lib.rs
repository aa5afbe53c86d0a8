//! Recollect - Persistent memory store for AI agents
//!
//! Memories are text records with an embedding vector, importance,
//! categories and an optional expiry. They are searchable by semantic
//! similarity, linked through a labelled relationship graph, and maintained
//! by decay, expiration and consolidation. State is journaled to disk and
//! served over HTTP.

pub mod config;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod server;
pub mod storage;
pub mod testing;

pub use config::Config;
pub use error::{RecollectError, Result};
pub use gateway::CapabilityGateway;
pub use memory::{MemoryStore, SearchQuery};

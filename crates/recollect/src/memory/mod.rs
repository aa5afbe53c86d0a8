//! Memory types and operations
//!
//! The repository (`MemoryStore`) and the engines it delegates to for
//! lifecycle management and consolidation.

pub mod consolidation;
pub mod lifecycle;
pub mod locks;
pub mod stats;
pub mod store;
pub mod types;

pub use consolidation::{ConsolidateRequest, Consolidator};
pub use lifecycle::{DecayReport, Decayer, decayed_importance};
pub use locks::LockTable;
pub use stats::{compute_stats, saturating_days};
pub use store::{MemoryStore, SearchQuery, StoreSettings, VALIDATION_KEY};
pub use types::{
    Memory, MemoryLink, MemoryStats, MemoryUpdate, Metadata, NewMemory, RelatedMemory,
    Relationship, SearchHit,
};

pub mod filter;
pub mod graph;
pub mod journal;
pub mod state;
pub mod vector;

pub use filter::{Condition, FilterField, MemoryFilter, Predicate};
pub use graph::{RelationshipGraph, RewirePlan};
pub use journal::{FileJournal, JOURNAL_FILE, Journal, LogEntry};
pub use state::StoreState;
pub use vector::{IndexQuery, RankKey, ScoredId, VectorIndex, cosine_similarity};

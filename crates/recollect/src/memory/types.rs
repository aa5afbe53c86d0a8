//! Memory types for the Recollect engine
//!
//! Defines the memory record, relationship edges, and the request/report
//! structures that flow through the store operations.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form metadata attached to a memory
pub type Metadata = Map<String, Value>;

/// Lowest importance a memory can have
pub const MIN_IMPORTANCE: u8 = 1;
/// Highest importance a memory can have
pub const MAX_IMPORTANCE: u8 = 10;

/// Clamp an importance value into the valid [1, 10] range
pub fn clamp_importance(importance: u8) -> u8 {
    importance.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE)
}

/// A single memory unit stored in the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    /// Unique identifier, assigned at creation
    pub id: Uuid,
    /// Natural-language content
    pub content: String,
    /// Embedding of `content`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// Arbitrary structured metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Importance in [1, 10]
    pub importance: u8,
    /// Semantic tags
    #[serde(default)]
    pub categories: BTreeSet<String>,
    /// When this memory was created
    pub created_at: DateTime<Utc>,
    /// When this memory was last mutated
    pub updated_at: DateTime<Utc>,
    /// After this instant the memory is treated as archived by searches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Archived memories are excluded from default search and listing
    #[serde(default)]
    pub archived: bool,
}

impl Memory {
    /// Create a new memory with default values
    pub fn new(content: String, vector: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content,
            vector: Some(vector),
            metadata: Metadata::new(),
            importance: MIN_IMPORTANCE,
            categories: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            expires_at: None,
            archived: false,
        }
    }

    /// Whether `expires_at` has passed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Neither archived nor expired
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.archived && !self.is_expired_at(now)
    }

    /// Whether default (non-archive-inclusive) lookups may see this memory
    pub fn is_visible(&self, include_archived: bool, now: DateTime<Utc>) -> bool {
        include_archived || self.is_active_at(now)
    }

    /// Merge metadata: new keys added, existing keys overwritten, nothing removed
    pub fn merge_metadata(&mut self, metadata: Metadata) {
        for (key, value) in metadata {
            self.metadata.insert(key, value);
        }
    }

    /// Update the importance of this memory
    pub fn set_importance(&mut self, importance: u8) {
        self.importance = clamp_importance(importance);
    }

    /// Mark this memory as mutated
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Rough number of bytes this memory occupies
    pub fn approximate_size(&self) -> usize {
        let vector_bytes = self
            .vector
            .as_ref()
            .map_or(0, |v| v.len() * std::mem::size_of::<f32>());
        let metadata_bytes = serde_json::to_string(&self.metadata).map_or(0, |s| s.len());
        let category_bytes: usize = self.categories.iter().map(String::len).sum();

        self.content.len() + vector_bytes + metadata_bytes + category_bytes
    }
}

/// Request to create a memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMemory {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Precomputed embedding; when absent the gateway computes one
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    #[serde(default = "default_importance")]
    pub importance: u8,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Original creation time, for importing existing memories
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_importance() -> u8 {
    MIN_IMPORTANCE
}

impl NewMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            importance: MIN_IMPORTANCE,
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Partial update of a memory. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryUpdate {
    #[serde(default)]
    pub content: Option<String>,
    /// Merged into existing metadata
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub importance: Option<u8>,
    /// Explicit embedding; skips re-embedding on content change
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
}

impl MemoryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn importance(mut self, importance: u8) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.metadata.is_none()
            && self.importance.is_none()
            && self.vector.is_none()
    }
}

/// Label on an edge between two memories.
///
/// The five named kinds are the recognized values; anything else is kept
/// verbatim as `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Relationship {
    #[default]
    Related,
    Contradicts,
    Follows,
    Refines,
    Supersedes,
    Other(String),
}

impl Relationship {
    pub fn as_str(&self) -> &str {
        match self {
            Relationship::Related => "related",
            Relationship::Contradicts => "contradicts",
            Relationship::Follows => "follows",
            Relationship::Refines => "refines",
            Relationship::Supersedes => "supersedes",
            Relationship::Other(label) => label,
        }
    }
}

impl From<String> for Relationship {
    fn from(label: String) -> Self {
        match label.to_lowercase().as_str() {
            "related" => Relationship::Related,
            "contradicts" => Relationship::Contradicts,
            "follows" => Relationship::Follows,
            "refines" => Relationship::Refines,
            "supersedes" => Relationship::Supersedes,
            _ => Relationship::Other(label),
        }
    }
}

impl From<&str> for Relationship {
    fn from(label: &str) -> Self {
        Relationship::from(label.to_string())
    }
}

impl From<Relationship> for String {
    fn from(relationship: Relationship) -> Self {
        relationship.as_str().to_string()
    }
}

impl FromStr for Relationship {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Relationship::from(s))
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed edge between two memories.
///
/// Bidirectional links are stored as two edges, both flagged `bidirectional`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryLink {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relationship: Relationship,
    pub bidirectional: bool,
}

impl MemoryLink {
    pub fn new(source_id: Uuid, target_id: Uuid, relationship: Relationship) -> Self {
        Self {
            source_id,
            target_id,
            relationship,
            bidirectional: false,
        }
    }

    /// The edge pointing the other way with the same label
    pub fn reversed(&self) -> Self {
        Self {
            source_id: self.target_id,
            target_id: self.source_id,
            relationship: self.relationship.clone(),
            bidirectional: self.bidirectional,
        }
    }

    pub fn touches(&self, id: Uuid) -> bool {
        self.source_id == id || self.target_id == id
    }
}

/// A memory reached by graph traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedMemory {
    pub id: Uuid,
    /// Label of the edge the memory was first reached through
    pub relationship: Relationship,
    /// Hops from the origin (1 = direct neighbour)
    pub depth: u32,
}

/// A search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub memory: Memory,
    /// Cosine similarity to the query, in [-1, 1]
    pub score: f32,
}

/// Aggregate statistics, computed on demand
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryStats {
    pub total: usize,
    /// Neither archived nor expired
    pub active: usize,
    pub archived: usize,
    /// Expired but not archived
    pub expired: usize,
    /// Most recent `updated_at` across all memories
    pub last_updated: Option<DateTime<Utc>>,
    pub categories: BTreeMap<String, usize>,
    pub importance: BTreeMap<u8, usize>,
    pub approximate_size_bytes: u64,
    /// Memories whose `expires_at` falls within the configured horizon
    pub expiring_soon: usize,
    pub links: usize,
}

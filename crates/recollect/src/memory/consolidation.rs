//! Consolidation of several memories into one
//!
//! The new memory, the rewired edges and the removal or archival of the
//! sources are committed as a single transaction. If anything fails before
//! the commit (missing source, embedding failure, journal failure) the
//! store is left exactly as it was.

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{RecollectError, Result};
use crate::memory::store::MemoryStore;
use crate::memory::types::{Memory, Metadata, clamp_importance};
use crate::storage::LogEntry;

/// Request to merge memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateRequest {
    pub ids: Vec<Uuid>,
    /// Content of the merged memory
    pub content: String,
    /// Replaces the merged source metadata when given
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Defaults to the highest source importance
    #[serde(default)]
    pub importance: Option<u8>,
    /// Delete the sources (default) instead of archiving them
    #[serde(default = "default_delete_originals")]
    pub delete_originals: bool,
}

fn default_delete_originals() -> bool {
    true
}

impl ConsolidateRequest {
    pub fn new(ids: Vec<Uuid>, content: impl Into<String>) -> Self {
        Self {
            ids,
            content: content.into(),
            metadata: None,
            importance: None,
            delete_originals: true,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn keep_originals(mut self) -> Self {
        self.delete_originals = false;
        self
    }
}

/// Merges memories and rewires the relationship graph
pub struct Consolidator<'a> {
    store: &'a MemoryStore,
}

impl<'a> Consolidator<'a> {
    pub fn new(store: &'a MemoryStore) -> Self {
        Self { store }
    }

    /// Consolidate `request.ids` into a new memory and return its id.
    ///
    /// Needs at least two distinct existing memories; archived sources are
    /// accepted. Sources are deleted, or archived with `delete_originals`
    /// off, so none stays active.
    pub async fn consolidate(&self, request: ConsolidateRequest) -> Result<Uuid> {
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = request
            .ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if ids.len() < 2 {
            return Err(RecollectError::NotFound(
                "consolidation requires at least two distinct memories".to_string(),
            ));
        }

        let locked = self.store.locks().lock_many(ids.iter().copied()).await;

        // Sources in input order, so later sources win metadata collisions
        let sources: Vec<Memory> = {
            let state = self.store.read_state().await;
            ids.iter()
                .map(|id| self.store.require_locked(&state, id).cloned())
                .collect::<Result<_>>()?
        };

        let vector = self.store.embed(&request.content).await?;

        let metadata = request.metadata.unwrap_or_else(|| {
            let mut merged = Metadata::new();
            for source in &sources {
                merged.extend(source.metadata.clone());
            }
            merged
        });
        let importance = request
            .importance
            .map(clamp_importance)
            .or_else(|| sources.iter().map(|m| m.importance).max())
            .unwrap_or(1);
        let categories: BTreeSet<String> = sources
            .iter()
            .flat_map(|m| m.categories.iter().cloned())
            .collect();

        let mut merged = Memory::new(request.content, vector);
        merged.metadata = metadata;
        merged.importance = importance;
        merged.categories = categories;
        let new_id = merged.id;

        let mut state = self.store.write_state().await;
        for id in &ids {
            self.store.require_locked(&state, id)?;
        }

        let source_set: HashSet<Uuid> = ids.iter().copied().collect();
        let plan = state.graph.plan_rewire(&source_set, new_id);

        let mut entries = vec![LogEntry::PutMemory { memory: merged }];
        entries.extend(plan.removed.iter().cloned().map(|link| LogEntry::RemoveLink { link }));
        entries.extend(plan.added.iter().cloned().map(|link| LogEntry::PutLink { link }));
        if request.delete_originals {
            entries.extend(ids.iter().map(|id| LogEntry::RemoveMemory { id: *id }));
        } else {
            entries.push(LogEntry::SetArchived {
                ids: ids.clone(),
                archived: true,
                at: Utc::now(),
            });
        }
        self.store.commit(&mut state, entries).await?;

        if request.delete_originals {
            for id in locked.ids() {
                self.store.locks().forget(id);
            }
        }

        info!(
            "Consolidated {} memories into {} ({} edges rewired, originals {})",
            ids.len(),
            new_id,
            plan.added.len(),
            if request.delete_originals {
                "deleted"
            } else {
                "archived"
            }
        );
        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults_from_json() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let request: ConsolidateRequest = serde_json::from_value(json!({
            "ids": [id, other],
            "content": "merged"
        }))
        .unwrap();

        assert!(request.delete_originals);
        assert!(request.metadata.is_none());
        assert!(request.importance.is_none());
    }

    #[test]
    fn test_request_builder() {
        let request = ConsolidateRequest::new(vec![], "merged")
            .with_importance(6)
            .keep_originals();
        assert_eq!(request.importance, Some(6));
        assert!(!request.delete_originals);
    }
}

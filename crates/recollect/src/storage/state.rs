//! In-memory store state: records, vector index and relationship graph
//!
//! All three are mutated only through [`StoreState::apply`], which is the
//! same path used for live writes and for journal replay.

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use super::graph::RelationshipGraph;
use super::journal::LogEntry;
use super::vector::VectorIndex;
use crate::error::{RecollectError, Result};
use crate::memory::types::Memory;

#[derive(Debug, Default)]
pub struct StoreState {
    pub memories: HashMap<Uuid, Memory>,
    pub index: VectorIndex,
    pub graph: RelationshipGraph,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.memories.contains_key(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<&Memory> {
        self.memories.get(id)
    }

    pub fn require(&self, id: &Uuid) -> Result<&Memory> {
        self.memories
            .get(id)
            .ok_or_else(|| RecollectError::not_found(*id))
    }

    /// Check a batch of entries against the current state without applying
    /// it, so a commit either applies fully or not at all.
    pub fn check(&self, entries: &[LogEntry]) -> Result<()> {
        for entry in entries {
            match entry {
                LogEntry::PutMemory { memory } => {
                    if let Some(vector) = &memory.vector {
                        let unchanged = self
                            .memories
                            .get(&memory.id)
                            .is_some_and(|m| m.vector.as_ref() == Some(vector));
                        if !unchanged {
                            self.index.validate(&memory.id, vector)?;
                        }
                    }
                }
                LogEntry::PutLink { link } => {
                    let pending = |id: Uuid| {
                        entries.iter().any(|e| {
                            matches!(e, LogEntry::PutMemory { memory } if memory.id == id)
                        })
                    };
                    for id in [link.source_id, link.target_id] {
                        if !self.contains(&id) && !pending(id) {
                            return Err(RecollectError::not_found(id));
                        }
                    }
                }
                LogEntry::RemoveMemory { .. }
                | LogEntry::SetArchived { .. }
                | LogEntry::RemoveLink { .. } => {}
            }
        }
        Ok(())
    }

    /// Apply one committed entry
    pub fn apply(&mut self, entry: LogEntry) -> Result<()> {
        match entry {
            LogEntry::PutMemory { memory } => {
                let active = !memory.archived;
                let unchanged = self
                    .memories
                    .get(&memory.id)
                    .is_some_and(|existing| existing.vector == memory.vector);

                match &memory.vector {
                    Some(_) if unchanged && self.index.contains(&memory.id) => {
                        self.index.set_active(&memory.id, active);
                    }
                    Some(vector) => self.index.upsert(memory.id, vector, active)?,
                    None => {
                        self.index.remove(&memory.id);
                    }
                }
                self.memories.insert(memory.id, memory);
            }
            LogEntry::RemoveMemory { id } => {
                self.memories.remove(&id);
                self.index.remove(&id);
                self.graph.remove_node(id);
            }
            LogEntry::SetArchived { ids, archived, at } => {
                for id in ids {
                    match self.memories.get_mut(&id) {
                        Some(memory) => {
                            memory.archived = archived;
                            memory.updated_at = at;
                            self.index.set_active(&id, !archived);
                        }
                        None => warn!("Archive flag for unknown memory {id} ignored"),
                    }
                }
            }
            LogEntry::PutLink { link } => {
                if self.contains(&link.source_id) && self.contains(&link.target_id) {
                    self.graph.insert(link);
                } else {
                    warn!(
                        "Dropping link {} -> {} to a missing memory",
                        link.source_id, link.target_id
                    );
                }
            }
            LogEntry::RemoveLink { link } => {
                self.graph.remove(&link);
            }
        }
        Ok(())
    }

    /// Minimal set of entries that recreates this state
    pub fn snapshot(&self) -> Vec<LogEntry> {
        let mut memories: Vec<&Memory> = self.memories.values().collect();
        memories.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut links: Vec<_> = self.graph.links().cloned().collect();
        links.sort_by(|a, b| {
            (a.source_id, a.target_id, a.relationship.as_str()).cmp(&(
                b.source_id,
                b.target_id,
                b.relationship.as_str(),
            ))
        });

        memories
            .into_iter()
            .map(|memory| LogEntry::PutMemory {
                memory: memory.clone(),
            })
            .chain(links.into_iter().map(|link| LogEntry::PutLink { link }))
            .collect()
    }
}

//! The memory repository
//!
//! `MemoryStore` owns the records, the vector index and the relationship
//! graph of one user/agent session. Writes follow one protocol:
//!
//! 1. take the per-memory locks of every memory the operation mutates
//!    (ascending id order), then call the capability gateway if needed;
//! 2. take the state write lock, re-validate, append the transaction to
//!    the journal, and only then apply it to the in-memory state.
//!
//! Per-memory locks are always acquired before the state lock, and no
//! gateway call is made while the state lock is held.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{Config, DecayConfig};
use crate::error::{RecollectError, Result};
use crate::gateway::{CapabilityGateway, Validation, types};
use crate::memory::consolidation::{ConsolidateRequest, Consolidator};
use crate::memory::lifecycle::{DecayReport, Decayer};
use crate::memory::locks::LockTable;
use crate::memory::stats::{compute_stats, saturating_days};
use crate::memory::types::{
    Memory, MemoryLink, MemoryStats, MemoryUpdate, NewMemory, RelatedMemory, Relationship,
    SearchHit, clamp_importance,
};
use crate::storage::{
    FileJournal, IndexQuery, JOURNAL_FILE, Journal, LogEntry, MemoryFilter, RankKey, StoreState,
};

/// Metadata key under which validation results are stored
pub const VALIDATION_KEY: &str = "validation";

/// Runtime settings of a store, derived from [`Config`]
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub default_limit: usize,
    pub min_relevance: f32,
    pub query_cache_capacity: usize,
    /// Upper bound for every capability gateway call
    pub gateway_timeout: Duration,
    pub expiry_horizon: chrono::Duration,
    pub decay: DecayConfig,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl StoreSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_limit: config.search.default_limit,
            min_relevance: config.search.min_relevance,
            query_cache_capacity: config.search.query_cache_capacity,
            gateway_timeout: Duration::from_secs(config.gateway.timeout_secs),
            expiry_horizon: saturating_days(config.stats.expiry_horizon_days),
            decay: config.decay.clone(),
        }
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }
}

/// A similarity search request. Exactly one of `text` or `vector` is used;
/// an explicit vector takes precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_relevance: Option<f32>,
    #[serde(default)]
    pub filter: MemoryFilter,
    #[serde(default)]
    pub include_archived: bool,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn vector(vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = Some(min_relevance);
        self
    }

    pub fn with_filter(mut self, filter: MemoryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn include_archived(mut self, include_archived: bool) -> Self {
        self.include_archived = include_archived;
        self
    }
}

pub struct MemoryStore {
    state: RwLock<StoreState>,
    locks: LockTable,
    gateway: Arc<dyn CapabilityGateway>,
    journal: Option<Arc<dyn Journal>>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
    settings: StoreSettings,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("gateway", &self.gateway.name())
            .field("persistent", &self.journal.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Create an in-memory store with default settings
    pub fn new(gateway: Arc<dyn CapabilityGateway>) -> Self {
        Self::with_settings(gateway, StoreSettings::default())
    }

    /// Create an in-memory store
    pub fn with_settings(gateway: Arc<dyn CapabilityGateway>, settings: StoreSettings) -> Self {
        let capacity =
            NonZeroUsize::new(settings.query_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: RwLock::new(StoreState::new()),
            locks: LockTable::new(),
            gateway,
            journal: None,
            query_cache: Mutex::new(LruCache::new(capacity)),
            settings,
        }
    }

    /// Open a store backed by `journal`, replaying its contents
    pub async fn with_journal(
        journal: Arc<dyn Journal>,
        gateway: Arc<dyn CapabilityGateway>,
        settings: StoreSettings,
    ) -> Result<Self> {
        let entries = journal.replay().await?;
        let replayed = entries.len();

        let mut state = StoreState::new();
        for entry in entries {
            state.apply(entry)?;
        }
        info!(
            "Replayed {} journal entries: {} memories, {} edges",
            replayed,
            state.memories.len(),
            state.graph.len()
        );

        let mut store = Self::with_settings(gateway, settings);
        store.state = RwLock::new(state);
        store.journal = Some(journal);
        Ok(store)
    }

    /// Open the store described by `config`: journaled under `data_dir`
    /// when persistence is enabled, in memory otherwise
    pub async fn open(config: &Config, gateway: Arc<dyn CapabilityGateway>) -> Result<Self> {
        let settings = StoreSettings::from_config(config);
        if !config.storage.persist {
            info!("Opening in-memory store (persistence disabled)");
            return Ok(Self::with_settings(gateway, settings));
        }

        let path = config.storage.data_dir.join(JOURNAL_FILE);
        info!("Opening store at {}", path.display());
        let journal = FileJournal::open(path).await?;
        Self::with_journal(Arc::new(journal), gateway, settings).await
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn gateway(&self) -> &Arc<dyn CapabilityGateway> {
        &self.gateway
    }

    pub fn is_persistent(&self) -> bool {
        self.journal.is_some()
    }

    /// Number of memories, archived included
    pub async fn len(&self) -> usize {
        self.state.read().await.memories.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // ------------------------------------------------------------------
    // Internals shared with the lifecycle and consolidation engines
    // ------------------------------------------------------------------

    pub(crate) async fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().await
    }

    pub(crate) async fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().await
    }

    pub(crate) fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Look up a memory whose lock the caller holds. A miss also drops the
    /// lock entry the caller's lookup created.
    pub(crate) fn require_locked<'s>(
        &self,
        state: &'s StoreState,
        id: &Uuid,
    ) -> Result<&'s Memory> {
        state.require(id).inspect_err(|_| self.locks.forget(id))
    }

    /// Validate, journal, then apply one transaction
    pub(crate) async fn commit(
        &self,
        state: &mut StoreState,
        entries: Vec<LogEntry>,
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        state.check(&entries)?;
        if let Some(journal) = &self.journal {
            journal.append(&entries).await?;
        }
        for entry in entries {
            state.apply(entry)?;
        }
        Ok(())
    }

    /// Run a gateway call under the configured timeout, wrapping failures
    pub(crate) async fn call_gateway<T, F>(&self, capability: &str, call: F) -> Result<T>
    where
        F: Future<Output = types::Result<T>>,
    {
        match tokio::time::timeout(self.settings.gateway_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into_storage(capability)),
            Err(_) => Err(RecollectError::Storage(format!(
                "{capability} timed out after {:?}",
                self.settings.gateway_timeout
            ))),
        }
    }

    pub(crate) async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self
            .call_gateway("Embedding", self.gateway.embed(text))
            .await?;
        if vector.is_empty() {
            return Err(RecollectError::Storage(
                "Embedding failed: gateway returned an empty vector".to_string(),
            ));
        }
        Ok(vector)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self
            .query_cache
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(text).cloned())
        {
            debug!("Query embedding cache hit");
            return Ok(vector);
        }

        let vector = self.embed(text).await?;
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(text.to_string(), vector.clone());
        }
        Ok(vector)
    }

    // ------------------------------------------------------------------
    // Repository operations
    // ------------------------------------------------------------------

    /// Store a new memory and return its id.
    ///
    /// Without an explicit vector the content is embedded through the
    /// gateway; an embedding failure fails the store.
    pub async fn store(&self, request: NewMemory) -> Result<Uuid> {
        let vector = match request.vector {
            Some(vector) => vector,
            None => self.embed(&request.content).await?,
        };

        let now = Utc::now();
        let memory = Memory {
            id: Uuid::new_v4(),
            content: request.content,
            vector: Some(vector),
            metadata: request.metadata,
            importance: clamp_importance(request.importance),
            categories: request.categories,
            created_at: request.created_at.unwrap_or(now),
            updated_at: now,
            expires_at: request.expires_at,
            archived: false,
        };
        let id = memory.id;

        let mut state = self.state.write().await;
        self.commit(&mut state, vec![LogEntry::PutMemory { memory }])
            .await?;

        debug!("Stored memory {}", id);
        Ok(id)
    }

    /// Fetch a memory. Archived or expired memories are only returned with
    /// `include_archived`.
    pub async fn get(&self, id: Uuid, include_archived: bool) -> Result<Memory> {
        let state = self.state.read().await;
        state
            .get(&id)
            .filter(|m| m.is_visible(include_archived, Utc::now()))
            .cloned()
            .ok_or_else(|| RecollectError::not_found(id))
    }

    /// Apply a partial update. Returns false if the update carries nothing.
    ///
    /// A content change re-embeds unless a vector is supplied; metadata is
    /// merged into the existing map.
    pub async fn update(&self, id: Uuid, update: MemoryUpdate) -> Result<bool> {
        let _guard = self.locks.lock(id).await;

        let existing = self.require_locked(&*self.state.read().await, &id)?.clone();
        if update.is_empty() {
            return Ok(false);
        }

        let content_changed = update
            .content
            .as_ref()
            .is_some_and(|content| *content != existing.content);
        let vector = match update.vector {
            Some(vector) => Some(vector),
            None if content_changed => {
                let content = update.content.as_deref().unwrap_or_default();
                Some(self.embed(content).await?)
            }
            None => None,
        };

        let mut updated = existing;
        if let Some(content) = update.content {
            updated.content = content;
        }
        if let Some(metadata) = update.metadata {
            updated.merge_metadata(metadata);
        }
        if let Some(importance) = update.importance {
            updated.set_importance(importance);
        }
        if let Some(vector) = vector {
            updated.vector = Some(vector);
        }
        updated.touch();

        let mut state = self.state.write().await;
        self.require_locked(&state, &id)?;
        self.commit(&mut state, vec![LogEntry::PutMemory { memory: updated }])
            .await?;

        debug!("Updated memory {}", id);
        Ok(true)
    }

    /// Delete one memory by id, or every memory matching a non-empty filter.
    ///
    /// Exactly one of the two must be given. Archived memories match filters
    /// too. Edges touching a deleted memory are removed with it.
    pub async fn delete(&self, id: Option<Uuid>, filter: &MemoryFilter) -> Result<usize> {
        match (id, filter.is_empty()) {
            (None, true) => Err(RecollectError::InvalidFilter(
                "delete requires a memory id or a non-empty filter".to_string(),
            )),
            (Some(_), false) => Err(RecollectError::InvalidFilter(
                "delete takes either a memory id or a filter, not both".to_string(),
            )),
            (Some(id), true) => {
                let _guard = self.locks.lock(id).await;
                let mut state = self.state.write().await;
                self.require_locked(&state, &id)?;
                self.commit(&mut state, vec![LogEntry::RemoveMemory { id }])
                    .await?;
                self.locks.forget(&id);

                debug!("Deleted memory {}", id);
                Ok(1)
            }
            (None, false) => {
                let candidates: Vec<Uuid> = {
                    let state = self.state.read().await;
                    state
                        .memories
                        .values()
                        .filter(|m| filter.matches(m))
                        .map(|m| m.id)
                        .collect()
                };
                if candidates.is_empty() {
                    return Ok(0);
                }

                let locked = self.locks.lock_many(candidates).await;
                let mut state = self.state.write().await;
                let entries: Vec<LogEntry> = locked
                    .ids()
                    .iter()
                    .filter(|id| state.get(id).is_some_and(|m| filter.matches(m)))
                    .map(|id| LogEntry::RemoveMemory { id: *id })
                    .collect();
                let count = entries.len();
                self.commit(&mut state, entries).await?;
                for id in locked.ids() {
                    self.locks.forget(id);
                }

                info!("Deleted {} memories by filter", count);
                Ok(count)
            }
        }
    }

    /// Archive memories. Returns how many changed state; already archived
    /// memories are a no-op. Any unknown id fails the whole batch.
    pub async fn archive(&self, ids: &[Uuid]) -> Result<usize> {
        self.set_archived(ids, true).await
    }

    /// Restore archived memories. Mirror of [`archive`](Self::archive).
    pub async fn restore(&self, ids: &[Uuid]) -> Result<usize> {
        self.set_archived(ids, false).await
    }

    async fn set_archived(&self, ids: &[Uuid], archived: bool) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let locked = self.locks.lock_many(ids.iter().copied()).await;
        let mut state = self.state.write().await;

        let mut changed = Vec::new();
        for id in locked.ids() {
            if self.require_locked(&state, id)?.archived != archived {
                changed.push(*id);
            }
        }
        let count = changed.len();
        if count > 0 {
            self.commit(
                &mut state,
                vec![LogEntry::SetArchived {
                    ids: changed,
                    archived,
                    at: Utc::now(),
                }],
            )
            .await?;
        }

        debug!(archived, count, "Updated archive state");
        Ok(count)
    }

    /// Similarity search over active memories (or all memories with
    /// `include_archived`). Results are ordered by score, then importance,
    /// then most recent update.
    pub async fn search(&self, query: SearchQuery) -> Result<Vec<SearchHit>> {
        let min_relevance = query.min_relevance.unwrap_or(self.settings.min_relevance);
        if !min_relevance.is_finite() {
            return Err(RecollectError::InvalidFilter(format!(
                "min_relevance must be a finite number, got {min_relevance}"
            )));
        }
        let vector = match (query.vector, query.text.as_deref()) {
            (Some(vector), _) => vector,
            (None, Some(text)) => self.embed_query(text).await?,
            (None, None) => {
                return Err(RecollectError::InvalidFilter(
                    "search requires a query vector or query text".to_string(),
                ));
            }
        };
        let limit = query.limit.unwrap_or(self.settings.default_limit);
        let include_archived = query.include_archived;
        let filter = &query.filter;

        let state = self.state.read().await;
        let now = Utc::now();
        let index_query = IndexQuery {
            vector: &vector,
            limit,
            min_relevance,
            include_archived,
        };
        let scored = state.index.search(&index_query, |id| {
            state
                .get(id)
                .filter(|m| m.is_visible(include_archived, now) && filter.matches(m))
                .map(|m| RankKey {
                    importance: m.importance,
                    updated_at: m.updated_at,
                })
        })?;

        Ok(scored
            .into_iter()
            .filter_map(|hit| {
                state.get(&hit.id).map(|memory| SearchHit {
                    memory: memory.clone(),
                    score: hit.score,
                })
            })
            .collect())
    }

    /// List memories, newest first
    pub async fn list(
        &self,
        filter: &MemoryFilter,
        include_archived: bool,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Memory>> {
        let state = self.state.read().await;
        let now = Utc::now();

        let mut memories: Vec<&Memory> = state
            .memories
            .values()
            .filter(|m| m.is_visible(include_archived, now) && filter.matches(m))
            .collect();
        memories.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(memories
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    /// Link memories in the order given: ids[0]-ids[1], ids[1]-ids[2], ...
    ///
    /// Bidirectional links also store the reverse edge. Returns whether any
    /// edge was added or changed.
    pub async fn link(
        &self,
        ids: &[Uuid],
        relationship: Relationship,
        bidirectional: bool,
    ) -> Result<bool> {
        if ids.len() < 2 {
            return Err(RecollectError::NotFound(
                "link requires at least two memories".to_string(),
            ));
        }

        let _locked = self.locks.lock_many(ids.iter().copied()).await;
        let mut state = self.state.write().await;
        for id in ids {
            self.require_locked(&state, id)?;
        }

        let mut planned: HashSet<MemoryLink> = HashSet::new();
        let mut entries = Vec::new();
        for pair in ids.windows(2) {
            let (source, target) = (pair[0], pair[1]);
            if source == target {
                continue;
            }
            let mut forward = MemoryLink::new(source, target, relationship.clone());
            forward.bidirectional = bidirectional;

            let mut edges = vec![forward.clone()];
            if bidirectional {
                edges.push(forward.reversed());
            }
            for edge in edges {
                if !state.graph.contains(&edge) && planned.insert(edge.clone()) {
                    entries.push(LogEntry::PutLink { link: edge });
                }
            }
        }

        let changed = !entries.is_empty();
        self.commit(&mut state, entries).await?;

        debug!(count = ids.len(), %relationship, "Linked memories");
        Ok(changed)
    }

    /// Breadth-first traversal of outgoing edges from `id`, up to `depth`
    /// hops. Without `include_archived`, archived and expired memories are
    /// neither reported nor traversed through.
    pub async fn related_memories(
        &self,
        id: Uuid,
        depth: u32,
        relationships: Option<&[Relationship]>,
        include_archived: bool,
    ) -> Result<Vec<RelatedMemory>> {
        let state = self.state.read().await;
        state.require(&id)?;

        let now = Utc::now();
        Ok(state.graph.traverse(id, depth, relationships, |node| {
            state
                .get(&node)
                .is_some_and(|m| m.is_visible(include_archived, now))
        }))
    }

    /// Edges touching `id`
    pub async fn links_of(&self, id: Uuid) -> Result<Vec<MemoryLink>> {
        let state = self.state.read().await;
        state.require(&id)?;
        Ok(state.graph.edges_touching(id))
    }

    /// Decay importance of old memories; see [`Decayer`]
    pub async fn decay(&self, config: &DecayConfig) -> Result<DecayReport> {
        Decayer::with_config(self, config.clone()).run().await
    }

    /// Decay with the store's configured parameters
    pub async fn decay_default(&self) -> Result<DecayReport> {
        self.decay(&self.settings.decay).await
    }

    /// Archive every memory whose expiry has passed
    pub async fn archive_expired(&self) -> Result<usize> {
        Decayer::new(self).archive_expired().await
    }

    /// Merge memories into one; see [`Consolidator`]
    pub async fn consolidate(&self, request: ConsolidateRequest) -> Result<Uuid> {
        Consolidator::new(self).consolidate(request).await
    }

    /// Ask the gateway for categories of each memory and union them into
    /// the memory's set. The batch commits atomically.
    pub async fn categorize(&self, ids: &[Uuid]) -> Result<BTreeMap<Uuid, BTreeSet<String>>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let locked = self.locks.lock_many(ids.iter().copied()).await;
        let snapshot: Vec<Memory> = {
            let state = self.state.read().await;
            locked
                .ids()
                .iter()
                .map(|id| self.require_locked(&state, id).cloned())
                .collect::<Result<_>>()?
        };

        let mut suggested = Vec::with_capacity(snapshot.len());
        for memory in &snapshot {
            let categories = self
                .call_gateway("Categorization", self.gateway.categorize(&memory.content))
                .await?;
            suggested.push(categories);
        }

        let mut state = self.state.write().await;
        let mut result = BTreeMap::new();
        let mut entries = Vec::new();
        for (memory, categories) in snapshot.into_iter().zip(suggested) {
            let mut updated = self.require_locked(&state, &memory.id)?.clone();
            let before = updated.categories.len();
            updated.categories.extend(
                categories
                    .into_iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty()),
            );
            if updated.categories.len() != before {
                updated.touch();
                entries.push(LogEntry::PutMemory {
                    memory: updated.clone(),
                });
            }
            result.insert(updated.id, updated.categories);
        }
        self.commit(&mut state, entries).await?;

        debug!(count = result.len(), "Categorized memories");
        Ok(result)
    }

    /// Ask the gateway whether a memory still holds. The verdict is stored
    /// under `metadata["validation"]`; a suggested update is not applied.
    pub async fn validate(&self, id: Uuid, context: Option<&str>) -> Result<Validation> {
        let _guard = self.locks.lock(id).await;
        let content = self.require_locked(&*self.state.read().await, &id)?.content.clone();

        let validation = self
            .call_gateway("Validation", self.gateway.validate(&content, context))
            .await?;

        let mut state = self.state.write().await;
        let mut updated = self.require_locked(&state, &id)?.clone();
        updated.metadata.insert(
            VALIDATION_KEY.to_string(),
            validation_record(&validation),
        );
        updated.touch();
        self.commit(&mut state, vec![LogEntry::PutMemory { memory: updated }])
            .await?;

        debug!(%id, is_valid = validation.is_valid, "Validated memory");
        Ok(validation)
    }

    /// Ask the gateway for insights across memories. Nothing is persisted.
    pub async fn reflect(&self, ids: &[Uuid], context: Option<&str>) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let contents: Vec<String> = {
            let state = self.state.read().await;
            ids.iter()
                .map(|id| state.require(id).map(|m| m.content.clone()))
                .collect::<Result<_>>()?
        };

        self.call_gateway("Reflection", self.gateway.reflect(&contents, context))
            .await
    }

    /// Aggregate statistics. `horizon` overrides the configured window for
    /// the "expiring soon" count.
    pub async fn stats(&self, horizon: Option<chrono::Duration>) -> Result<MemoryStats> {
        let state = self.state.read().await;
        Ok(compute_stats(
            &state,
            Utc::now(),
            horizon.unwrap_or(self.settings.expiry_horizon),
        ))
    }

    /// Rewrite the journal as a minimal snapshot. Returns the number of
    /// entries written, or 0 for an in-memory store.
    pub async fn compact(&self) -> Result<usize> {
        let Some(journal) = &self.journal else {
            return Ok(0);
        };

        let state = self.state.write().await;
        let snapshot = state.snapshot();
        let count = snapshot.len();
        journal.rewrite(&snapshot).await?;

        info!("Compacted journal to {} entries", count);
        Ok(count)
    }
}

fn validation_record(validation: &Validation) -> Value {
    json!({
        "is_valid": validation.is_valid,
        "confidence": validation.confidence,
        "reason": validation.reason,
        "suggested_update": validation.suggested_update,
        "validated_at": Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;

    fn store() -> (MemoryStore, Arc<MockGateway>) {
        let gateway = Arc::new(MockGateway::new(16));
        (MemoryStore::new(gateway.clone()), gateway)
    }

    #[tokio::test]
    async fn test_store_embeds_when_vector_missing() {
        let (store, gateway) = store();

        let id = store.store(NewMemory::new("User is vegetarian")).await.unwrap();
        let memory = store.get(id, false).await.unwrap();

        assert_eq!(gateway.embed_calls(), 1);
        assert_eq!(memory.vector.as_ref().map(Vec::len), Some(16));
    }

    #[tokio::test]
    async fn test_store_with_vector_skips_gateway() {
        let (store, gateway) = store();

        store
            .store(NewMemory::new("explicit").with_vector(vec![1.0; 16]))
            .await
            .unwrap();
        assert_eq!(gateway.embed_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_embedding_failure_stores_nothing() {
        let (store, gateway) = store();
        gateway.set_failing(true);

        let err = store.store(NewMemory::new("unreachable")).await.unwrap_err();
        assert!(err.is_storage());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_gateway_timeout_is_storage_error() {
        let gateway = Arc::new(MockGateway::new(4).with_latency(Duration::from_millis(200)));
        let settings = StoreSettings::default().with_gateway_timeout(Duration::from_millis(20));
        let store = MemoryStore::with_settings(gateway, settings);

        let err = store.store(NewMemory::new("slow")).await.unwrap_err();
        assert!(err.is_storage());
        assert!(err.to_string().contains("timed out"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_without_changes_returns_false() {
        let (store, _) = store();
        let id = store.store(NewMemory::new("a")).await.unwrap();

        assert!(!store.update(id, MemoryUpdate::new()).await.unwrap());
        assert!(
            store
                .update(Uuid::new_v4(), MemoryUpdate::new())
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_update_same_content_does_not_reembed() {
        let (store, gateway) = store();
        let id = store.store(NewMemory::new("same")).await.unwrap();

        store
            .update(id, MemoryUpdate::new().content("same").importance(4))
            .await
            .unwrap();
        assert_eq!(gateway.embed_calls(), 1);
        assert_eq!(store.get(id, false).await.unwrap().importance, 4);
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let (store, _) = store();
        let err = store.search(SearchQuery::default()).await.unwrap_err();
        assert!(err.is_invalid_filter());
    }

    #[tokio::test]
    async fn test_query_embeddings_are_cached() {
        let (store, gateway) = store();
        store.store(NewMemory::new("oat milk")).await.unwrap();
        let before = gateway.embed_calls();

        store.search(SearchQuery::text("milk")).await.unwrap();
        store.search(SearchQuery::text("milk")).await.unwrap();
        assert_eq!(gateway.embed_calls(), before + 1);
    }

    #[tokio::test]
    async fn test_link_requires_two_ids() {
        let (store, _) = store();
        let id = store.store(NewMemory::new("alone")).await.unwrap();

        assert!(
            store
                .link(&[id], Relationship::Related, true)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_link_is_idempotent() {
        let (store, _) = store();
        let a = store.store(NewMemory::new("a")).await.unwrap();
        let b = store.store(NewMemory::new("b")).await.unwrap();

        assert!(store.link(&[a, b], Relationship::Related, true).await.unwrap());
        assert!(!store.link(&[a, b], Relationship::Related, true).await.unwrap());
        assert_eq!(store.links_of(a).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_validate_records_verdict() {
        let gateway = Arc::new(MockGateway::new(8).with_validation(
            Validation::new(false, 0.7, "User went vegan").with_suggested_update("User is vegan"),
        ));
        let store = MemoryStore::new(gateway);
        let id = store.store(NewMemory::new("User is vegetarian")).await.unwrap();

        let validation = store.validate(id, Some("no more dairy")).await.unwrap();
        assert!(!validation.is_valid);

        let memory = store.get(id, false).await.unwrap();
        assert_eq!(memory.content, "User is vegetarian");
        let record = &memory.metadata[VALIDATION_KEY];
        assert_eq!(record["is_valid"], json!(false));
        assert_eq!(record["suggested_update"], json!("User is vegan"));
        assert!(record.get("validated_at").is_some());
    }

    #[tokio::test]
    async fn test_categorize_unions_categories() {
        let gateway = Arc::new(
            MockGateway::new(8).with_categories(vec!["diet".to_string(), "health".to_string()]),
        );
        let store = MemoryStore::new(gateway);
        let id = store
            .store(NewMemory::new("User is vegetarian").with_categories(["preferences"]))
            .await
            .unwrap();

        let result = store.categorize(&[id]).await.unwrap();
        let expected: BTreeSet<String> = ["diet", "health", "preferences"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(result[&id], expected);
        assert_eq!(store.get(id, false).await.unwrap().categories, expected);
    }

    #[tokio::test]
    async fn test_categorize_failure_changes_nothing() {
        let (store, gateway) = store();
        let a = store.store(NewMemory::new("a")).await.unwrap();
        let b = store.store(NewMemory::new("b")).await.unwrap();
        gateway.set_failing(true);

        assert!(store.categorize(&[a, b]).await.unwrap_err().is_storage());
        assert!(store.get(a, false).await.unwrap().categories.is_empty());
    }

    #[tokio::test]
    async fn test_reflect_forwards_insights() {
        let gateway =
            Arc::new(MockGateway::new(8).with_insights(vec!["Prefers plants".to_string()]));
        let store = MemoryStore::new(gateway.clone());
        let id = store.store(NewMemory::new("likes tofu")).await.unwrap();

        let insights = store.reflect(&[id], None).await.unwrap();
        assert_eq!(insights, vec!["Prefers plants"]);
        assert_eq!(gateway.reflect_calls(), 1);

        assert!(store.reflect(&[Uuid::new_v4()], None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_compact_in_memory_is_noop() {
        let (store, _) = store();
        store.store(NewMemory::new("a")).await.unwrap();
        assert_eq!(store.compact().await.unwrap(), 0);
        assert!(!store.is_persistent());
    }

    #[tokio::test]
    async fn test_failed_lookups_leave_no_lock_entries() {
        let (store, _) = store();
        let id = store
            .store(NewMemory::new("kept").with_vector(vec![1.0, 0.0]))
            .await
            .unwrap();
        let unknown = Uuid::new_v4();

        assert!(store.update(unknown, MemoryUpdate::new().importance(3)).await.is_err());
        assert!(store.validate(unknown, None).await.is_err());
        assert!(store.archive(&[unknown]).await.is_err());
        assert!(store.restore(&[id, unknown]).await.is_err());
        assert!(store.link(&[id, unknown], Relationship::Related, true).await.is_err());
        assert!(store.categorize(&[unknown]).await.is_err());
        assert!(store.delete(Some(unknown), &MemoryFilter::new()).await.is_err());
        assert!(
            store
                .consolidate(ConsolidateRequest::new(vec![id, unknown], "merged"))
                .await
                .is_err()
        );

        assert!(store.locks().len() <= 1);
        assert!(!store.locks().contains(&unknown));
    }

    #[tokio::test]
    async fn test_search_rejects_non_finite_min_relevance() {
        let (store, gateway) = store();
        store
            .store(NewMemory::new("anything").with_vector(vec![1.0; 16]))
            .await
            .unwrap();

        for min_relevance in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let err = store
                .search(SearchQuery::text("anything").with_min_relevance(min_relevance))
                .await
                .unwrap_err();
            assert!(err.is_invalid_filter());
        }
        assert_eq!(gateway.embed_calls(), 0);
    }
}

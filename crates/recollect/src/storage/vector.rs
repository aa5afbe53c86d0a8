//! In-process vector index with cosine similarity search
//!
//! Exhaustive scan over normalized embeddings. Each entry carries an
//! "active" bit that archival flips instead of removing the vector, so
//! archive/restore never re-index.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{RecollectError, Result};

#[derive(Debug, Clone)]
struct IndexEntry {
    /// Unit-length copy of the embedding
    unit: Vec<f32>,
    active: bool,
}

/// Secondary sort keys for equal scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankKey {
    pub importance: u8,
    pub updated_at: DateTime<Utc>,
}

/// A scored index hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredId {
    pub id: Uuid,
    pub score: f32,
}

/// Query parameters for [`VectorIndex::search`]
#[derive(Debug, Clone, Copy)]
pub struct IndexQuery<'a> {
    pub vector: &'a [f32],
    pub limit: usize,
    pub min_relevance: f32,
    pub include_archived: bool,
}

#[derive(Debug, Default)]
pub struct VectorIndex {
    entries: HashMap<Uuid, IndexEntry>,
    dimension: Option<usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_active(&self, id: &Uuid) -> Option<bool> {
        self.entries.get(id).map(|e| e.active)
    }

    /// Check that `vector` can be stored for `id` without modifying anything.
    ///
    /// The dimension is fixed by the entries already present; it may only
    /// change when the index is empty or `id` is its sole entry.
    pub fn validate(&self, id: &Uuid, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(RecollectError::Storage("Embedding is empty".to_string()));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(RecollectError::Storage(
                "Embedding contains non-finite values".to_string(),
            ));
        }
        if let Some(dimension) = self.dimension {
            let sole_entry = self.entries.len() == 1 && self.entries.contains_key(id);
            if vector.len() != dimension && !sole_entry {
                return Err(RecollectError::Storage(format!(
                    "Embedding dimension mismatch: index holds {dimension}, got {}",
                    vector.len()
                )));
            }
        }
        Ok(())
    }

    /// Insert or replace the embedding for `id`
    pub fn upsert(&mut self, id: Uuid, vector: &[f32], active: bool) -> Result<()> {
        self.validate(&id, vector)?;

        self.dimension = Some(vector.len());
        self.entries.insert(
            id,
            IndexEntry {
                unit: normalize(vector),
                active,
            },
        );
        Ok(())
    }

    /// Flip the active bit. Returns false if `id` is not indexed.
    pub fn set_active(&mut self, id: &Uuid, active: bool) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.active = active;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &Uuid) -> bool {
        let removed = self.entries.remove(id).is_some();
        if self.entries.is_empty() {
            self.dimension = None;
        }
        removed
    }

    /// Top-K cosine similarity search.
    ///
    /// `rank` is consulted for every entry that passes the relevance and
    /// active-bit checks; it returns `None` to filter the entry out, or the
    /// tie-break keys otherwise. Results are sorted by score descending, then
    /// importance descending, then most recently updated first.
    pub fn search<F>(&self, query: &IndexQuery<'_>, mut rank: F) -> Result<Vec<ScoredId>>
    where
        F: FnMut(&Uuid) -> Option<RankKey>,
    {
        if query.limit == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(dimension) = self.dimension {
            if query.vector.len() != dimension {
                return Err(RecollectError::Storage(format!(
                    "Query dimension mismatch: index holds {dimension}, got {}",
                    query.vector.len()
                )));
            }
        }

        let query_unit = normalize(query.vector);
        if query_unit.iter().all(|v| *v == 0.0) {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<(ScoredId, RankKey)> = self
            .entries
            .iter()
            .filter(|(_, entry)| query.include_archived || entry.active)
            .filter_map(|(id, entry)| {
                let score = dot(&query_unit, &entry.unit).clamp(-1.0, 1.0);
                if score < query.min_relevance {
                    return None;
                }
                rank(id).map(|key| (ScoredId { id: *id, score }, key))
            })
            .collect();

        candidates.sort_by(|(a, ka), (b, kb)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| kb.importance.cmp(&ka.importance))
                .then_with(|| kb.updated_at.cmp(&ka.updated_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates.truncate(query.limit);

        Ok(candidates.into_iter().map(|(hit, _)| hit).collect())
    }
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vec![0.0; vector.len()];
    }
    vector.iter().map(|v| v / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity of two raw vectors (0.0 if either has zero norm)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

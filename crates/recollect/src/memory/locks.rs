//! Per-memory mutation locks
//!
//! Every mutation of a memory holds that memory's lock for its whole
//! duration, gateway round-trip included. Multi-memory operations take
//! their locks in ascending id order so overlapping sets cannot deadlock.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Guards held for a set of memory ids
#[derive(Debug)]
pub struct LockSet {
    _guards: Vec<OwnedMutexGuard<()>>,
    ids: Vec<Uuid>,
}

impl LockSet {
    /// The locked ids, ascending
    pub fn ids(&self) -> &[Uuid] {
        &self.ids
    }
}

#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock a single memory
    pub async fn lock(&self, id: Uuid) -> OwnedMutexGuard<()> {
        self.handle(id).lock_owned().await
    }

    /// Lock several memories in ascending id order. Duplicates are locked once.
    pub async fn lock_many<I>(&self, ids: I) -> LockSet
    where
        I: IntoIterator<Item = Uuid>,
    {
        let ids: Vec<Uuid> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.handle(*id).lock_owned().await);
        }
        LockSet {
            _guards: guards,
            ids,
        }
    }

    /// Drop the lock entry of a deleted memory.
    ///
    /// Called while holding that memory's lock; kept if anyone else is
    /// waiting on it.
    pub fn forget(&self, id: &Uuid) {
        self.locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) <= 2);
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.locks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

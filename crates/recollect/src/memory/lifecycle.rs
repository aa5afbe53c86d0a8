//! Memory lifecycle: importance decay and expiration
//!
//! Decay lowers the importance of memories older than a threshold and can
//! archive those that fall to the floor. Expiration archives memories whose
//! `expires_at` has passed. Neither ever deletes.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DecayConfig;
use crate::error::Result;
use crate::memory::store::MemoryStore;
use crate::memory::types::MIN_IMPORTANCE;
use crate::storage::LogEntry;

/// Result of a decay run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecayReport {
    /// Memories whose importance was recomputed
    pub decayed_count: usize,
    /// Memories archived because they fell to `min_importance`
    pub archived_count: usize,
    pub avg_importance_before: f64,
    pub avg_importance_after: f64,
    pub decayed_ids: Vec<Uuid>,
}

/// Importance after one decay step.
///
/// `round(importance * factor)`, never below `min_importance` (when the
/// memory started above it) or 1, and never above the current value.
pub fn decayed_importance(importance: u8, factor: f64, min_importance: u8) -> u8 {
    let factor = if factor.is_finite() {
        factor.clamp(0.0, 1.0)
    } else {
        1.0
    };
    let floor = if importance > min_importance {
        min_importance.max(MIN_IMPORTANCE)
    } else {
        MIN_IMPORTANCE
    };
    let scaled = (f64::from(importance) * factor).round() as u8;
    scaled.max(floor).min(importance)
}

/// Applies decay and expiration to a store
pub struct Decayer<'a> {
    store: &'a MemoryStore,
    config: DecayConfig,
}

impl<'a> Decayer<'a> {
    /// Create a new Decayer with default configuration
    pub fn new(store: &'a MemoryStore) -> Self {
        Self {
            store,
            config: DecayConfig::default(),
        }
    }

    pub fn with_config(store: &'a MemoryStore, config: DecayConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Run one decay pass.
    ///
    /// Eligible ids are snapshotted first (active memories older than the
    /// threshold) along with their `updated_at`. Each memory is then locked
    /// and skipped if it was archived or modified since the snapshot, so two
    /// concurrent runs never apply the factor twice to the same memory.
    pub async fn run(&self) -> Result<DecayReport> {
        let now = Utc::now();
        // A threshold reaching before the earliest representable time makes
        // nothing old enough
        let Some(cutoff) = Duration::try_days(self.config.age_threshold_days)
            .and_then(|threshold| now.checked_sub_signed(threshold))
        else {
            debug!(
                age_threshold_days = self.config.age_threshold_days,
                "Decay threshold out of range, nothing eligible"
            );
            return Ok(DecayReport::default());
        };

        let snapshot: HashMap<Uuid, DateTime<Utc>> = {
            let state = self.store.read_state().await;
            state
                .memories
                .values()
                .filter(|m| m.is_active_at(now) && m.created_at < cutoff)
                .map(|m| (m.id, m.updated_at))
                .collect()
        };

        if snapshot.is_empty() {
            debug!("No memories eligible for decay");
            return Ok(DecayReport::default());
        }

        let locked = self.store.locks().lock_many(snapshot.keys().copied()).await;
        let mut state = self.store.write_state().await;
        let at = Utc::now();

        let mut report = DecayReport::default();
        let mut before_sum = 0u64;
        let mut after_sum = 0u64;
        let mut updates = Vec::new();
        let mut to_archive = Vec::new();

        for id in locked.ids() {
            let Some(memory) = state.get(id) else {
                continue;
            };
            if memory.archived || snapshot.get(id) != Some(&memory.updated_at) {
                continue;
            }

            let before = memory.importance;
            let after = decayed_importance(
                before,
                self.config.decay_factor,
                self.config.min_importance,
            );
            before_sum += u64::from(before);
            after_sum += u64::from(after);
            report.decayed_count += 1;
            report.decayed_ids.push(*id);

            let archive = self.config.archive_decayed && after <= self.config.min_importance;
            if after != before {
                let mut updated = memory.clone();
                updated.importance = after;
                updated.updated_at = at;
                updates.push(LogEntry::PutMemory { memory: updated });
            }
            if archive {
                to_archive.push(*id);
            }
        }

        if report.decayed_count > 0 {
            let n = report.decayed_count as f64;
            report.avg_importance_before = before_sum as f64 / n;
            report.avg_importance_after = after_sum as f64 / n;
        }
        report.archived_count = to_archive.len();

        let mut entries = updates;
        if !to_archive.is_empty() {
            entries.push(LogEntry::SetArchived {
                ids: to_archive,
                archived: true,
                at,
            });
        }
        self.store.commit(&mut state, entries).await?;

        info!(
            "Decay: {} decayed, {} archived, avg importance {:.2} -> {:.2}",
            report.decayed_count,
            report.archived_count,
            report.avg_importance_before,
            report.avg_importance_after
        );
        Ok(report)
    }

    /// Archive memories whose expiry has passed. Returns how many changed.
    pub async fn archive_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let candidates: Vec<Uuid> = {
            let state = self.store.read_state().await;
            state
                .memories
                .values()
                .filter(|m| !m.archived && m.is_expired_at(now))
                .map(|m| m.id)
                .collect()
        };
        if candidates.is_empty() {
            return Ok(0);
        }

        let locked = self.store.locks().lock_many(candidates).await;
        let mut state = self.store.write_state().await;
        let expired: Vec<Uuid> = locked
            .ids()
            .iter()
            .filter(|id| {
                state
                    .get(id)
                    .is_some_and(|m| !m.archived && m.is_expired_at(now))
            })
            .copied()
            .collect();

        let count = expired.len();
        if count > 0 {
            self.store
                .commit(
                    &mut state,
                    vec![LogEntry::SetArchived {
                        ids: expired,
                        archived: true,
                        at: Utc::now(),
                    }],
                )
                .await?;
        }

        info!("Archived {} expired memories", count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::NewMemory;
    use crate::testing::MockGateway;
    use std::sync::Arc;

    #[test]
    fn test_decayed_importance_default_factor() {
        assert_eq!(decayed_importance(10, 0.9, 1), 9);
        assert_eq!(decayed_importance(5, 0.9, 1), 5); // 4.5 rounds to 5
        assert_eq!(decayed_importance(4, 0.9, 1), 4); // 3.6 rounds to 4
        assert_eq!(decayed_importance(1, 0.9, 1), 1);
    }

    #[test]
    fn test_decayed_importance_respects_min() {
        assert_eq!(decayed_importance(8, 0.1, 3), 3);
        assert_eq!(decayed_importance(2, 0.1, 3), 1);
    }

    #[test]
    fn test_decayed_importance_never_increases() {
        for importance in 1..=10u8 {
            for min in 1..=10u8 {
                for factor in [0.0, 0.25, 0.5, 0.9, 1.0, 1.5, f64::NAN] {
                    let after = decayed_importance(importance, factor, min);
                    assert!(after <= importance);
                    assert!(after >= 1);
                }
            }
        }
    }

    #[test]
    fn test_decay_report_default() {
        let report = DecayReport::default();
        assert_eq!(report.decayed_count, 0);
        assert_eq!(report.avg_importance_before, 0.0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_double_decay() {
        let store = Arc::new(MemoryStore::new(Arc::new(MockGateway::default())));
        let id = store
            .store(
                NewMemory::new("old")
                    .with_importance(10)
                    .with_created_at(Utc::now() - Duration::days(90)),
            )
            .await
            .unwrap();
        let config = DecayConfig {
            decay_factor: 0.5,
            archive_decayed: false,
            ..DecayConfig::default()
        };

        // Both runs snapshot while the memory is locked, then race for it
        let guard = store.locks().lock(id).await;
        let runs: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let config = config.clone();
                tokio::spawn(async move { store.decay(&config).await })
            })
            .collect();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(guard);

        let mut decayed = 0;
        for run in runs {
            decayed += run.await.unwrap().unwrap().decayed_count;
        }

        assert_eq!(decayed, 1);
        assert_eq!(store.get(id, false).await.unwrap().importance, 5);
    }
}

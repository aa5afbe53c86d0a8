//! On-demand store statistics

use chrono::{DateTime, Duration, Utc};

use crate::memory::types::MemoryStats;
use crate::storage::StoreState;

/// Rough per-edge footprint: two ids, a label and a flag
const EDGE_SIZE_ESTIMATE: u64 = 48;

/// Day count as a duration, saturating at the largest representable span
pub fn saturating_days(days: i64) -> Duration {
    Duration::try_days(days).unwrap_or(if days < 0 {
        Duration::MIN
    } else {
        Duration::MAX
    })
}

/// Aggregate the state at `now`.
///
/// `expiring_soon` counts unarchived memories whose expiry falls in
/// `(now, now + horizon]`. A horizon past the end of representable time
/// counts every future expiry; one before its start counts none.
pub fn compute_stats(state: &StoreState, now: DateTime<Utc>, horizon: Duration) -> MemoryStats {
    let mut stats = MemoryStats {
        total: state.memories.len(),
        links: state.graph.len(),
        ..Default::default()
    };
    let window_end = match now.checked_add_signed(horizon) {
        Some(end) => Some(end),
        None if horizon < Duration::zero() => Some(now),
        None => None,
    };
    let mut size = 0u64;

    for memory in state.memories.values() {
        if memory.archived {
            stats.archived += 1;
        } else if memory.is_expired_at(now) {
            stats.expired += 1;
        } else {
            stats.active += 1;
        }

        if let Some(expires_at) = memory.expires_at {
            if !memory.archived
                && expires_at > now
                && window_end.is_none_or(|end| expires_at <= end)
            {
                stats.expiring_soon += 1;
            }
        }

        stats.last_updated = stats.last_updated.max(Some(memory.updated_at));
        for category in &memory.categories {
            *stats.categories.entry(category.clone()).or_default() += 1;
        }
        *stats.importance.entry(memory.importance).or_default() += 1;
        size += memory.approximate_size() as u64;
    }

    stats.approximate_size_bytes = size + stats.links as u64 * EDGE_SIZE_ESTIMATE;
    stats
}

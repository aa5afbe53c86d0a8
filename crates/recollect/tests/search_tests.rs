//! Similarity search: ordering, relevance cutoff, archival and filters

use std::sync::Arc;

use chrono::{Duration, Utc};

use recollect::memory::{MemoryStore, MemoryUpdate, NewMemory, SearchQuery};
use recollect::storage::MemoryFilter;
use recollect::testing::MockGateway;

fn create_store() -> MemoryStore {
    MemoryStore::new(Arc::new(MockGateway::default()))
}

async fn store_vector(
    store: &MemoryStore,
    content: &str,
    vector: Vec<f32>,
    importance: u8,
) -> uuid::Uuid {
    store
        .store(
            NewMemory::new(content)
                .with_vector(vector)
                .with_importance(importance),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_results_sorted_by_score() {
    let store = create_store();
    let exact = store_vector(&store, "exact", vec![1.0, 0.0, 0.0], 1).await;
    let close = store_vector(&store, "close", vec![0.8, 0.6, 0.0], 1).await;
    let far = store_vector(&store, "far", vec![0.0, 0.0, 1.0], 1).await;

    let hits = store
        .search(SearchQuery::vector(vec![1.0, 0.0, 0.0]))
        .await
        .unwrap();

    let ids: Vec<_> = hits.iter().map(|h| h.memory.id).collect();
    assert_eq!(ids, vec![exact, close, far]);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!((hits[1].score - 0.8).abs() < 1e-6);
}

#[tokio::test]
async fn test_min_relevance_excludes_weak_matches() {
    let store = create_store();
    store_vector(&store, "exact", vec![1.0, 0.0, 0.0], 1).await;
    store_vector(&store, "close", vec![0.8, 0.6, 0.0], 1).await;
    store_vector(&store, "far", vec![0.0, 0.0, 1.0], 1).await;

    let hits = store
        .search(SearchQuery::vector(vec![1.0, 0.0, 0.0]).with_min_relevance(0.5))
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.score >= 0.5));
}

#[tokio::test]
async fn test_ties_prefer_importance() {
    let store = create_store();
    let low = store_vector(&store, "low", vec![0.0, 1.0], 2).await;
    let high = store_vector(&store, "high", vec![0.0, 1.0], 9).await;

    let hits = store
        .search(SearchQuery::vector(vec![0.0, 1.0]))
        .await
        .unwrap();
    assert_eq!(hits[0].memory.id, high);
    assert_eq!(hits[1].memory.id, low);
}

#[tokio::test]
async fn test_archived_and_expired_excluded_by_default() {
    let store = create_store();
    let active = store_vector(&store, "active", vec![1.0, 0.0], 1).await;
    let archived = store_vector(&store, "archived", vec![1.0, 0.1], 1).await;
    let expired = store
        .store(
            NewMemory::new("expired")
                .with_vector(vec![1.0, 0.2])
                .expires_at(Utc::now() - Duration::seconds(1)),
        )
        .await
        .unwrap();
    store.archive(&[archived]).await.unwrap();

    let hits = store
        .search(SearchQuery::vector(vec![1.0, 0.0]))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.id, active);

    let all = store
        .search(SearchQuery::vector(vec![1.0, 0.0]).include_archived(true))
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|h| h.memory.id).collect();
    assert!(ids.contains(&archived));
    assert!(ids.contains(&expired));

    store.restore(&[archived]).await.unwrap();
    let hits = store
        .search(SearchQuery::vector(vec![1.0, 0.0]))
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn test_filter_and_limit() {
    let store = create_store();
    for i in 0..5 {
        store
            .store(
                NewMemory::new(format!("diet {i}"))
                    .with_vector(vec![1.0, i as f32 * 0.1])
                    .with_categories(["diet"]),
            )
            .await
            .unwrap();
    }
    store_vector(&store, "work", vec![1.0, 0.0], 1).await;

    let hits = store
        .search(
            SearchQuery::vector(vec![1.0, 0.0])
                .with_filter(MemoryFilter::new().with_category("diet"))
                .with_limit(3),
        )
        .await
        .unwrap();

    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.memory.categories.contains("diet")));
    assert_eq!(hits[0].memory.content, "diet 0");
}

#[tokio::test]
async fn test_text_query_uses_gateway_embedding() {
    let store = create_store();
    let hiking = store.store(NewMemory::new("User loves hiking in the alps")).await.unwrap();
    store.store(NewMemory::new("Quarterly tax report is due")).await.unwrap();

    let hits = store
        .search(SearchQuery::text("hiking alps").with_limit(1))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.id, hiking);
}

#[tokio::test]
async fn test_no_match_is_empty_not_error() {
    let store = create_store();
    store_vector(&store, "x", vec![1.0, 0.0], 1).await;

    let hits = store
        .search(SearchQuery::vector(vec![0.0, 1.0]).with_min_relevance(0.9))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_index_follows_updates_and_deletes() {
    let store = create_store();
    let id = store_vector(&store, "moving", vec![1.0, 0.0], 1).await;
    let other = store_vector(&store, "static", vec![0.6, 0.8], 1).await;

    store
        .update(id, MemoryUpdate::new().vector(vec![0.0, 1.0]))
        .await
        .unwrap();
    let hits = store
        .search(SearchQuery::vector(vec![0.0, 1.0]).with_limit(1))
        .await
        .unwrap();
    assert_eq!(hits[0].memory.id, id);

    store.delete(Some(id), &MemoryFilter::new()).await.unwrap();
    let hits = store
        .search(SearchQuery::vector(vec![0.0, 1.0]))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.id, other);
}

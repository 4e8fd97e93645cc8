//! File-backed persistent tier under concurrent writers.

use std::sync::Arc;
use std::time::Duration;

use ivcrush_data::{CacheKind, PersistentStore, SqliteStore, TwoTierCache};
use tempfile::TempDir;

async fn store_in(dir: &TempDir) -> SqliteStore {
    let url = format!("sqlite://{}", dir.path().join("cache.db").display());
    SqliteStore::connect(&url).await.unwrap()
}

#[tokio::test]
async fn concurrent_writers_all_land() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store_in(&dir).await);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        tasks.spawn(async move {
            store
                .set(&format!("quote:T{i}"), &i.to_string(), Duration::from_secs(300))
                .await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    for i in 0..16 {
        let entry = store.get(&format!("quote:T{i}")).await.unwrap().unwrap();
        assert_eq!(entry.value, i.to_string());
    }
}

#[tokio::test]
async fn entries_survive_a_new_session() {
    let dir = TempDir::new().unwrap();
    {
        let cache = TwoTierCache::new(8).with_store(Arc::new(store_in(&dir).await));
        cache
            .set(CacheKind::EarningsCalendar, "AAPL", "2024-05-02")
            .await
            .unwrap();
    }

    let cache = TwoTierCache::new(8).with_store(Arc::new(store_in(&dir).await));
    let date: Option<String> = cache.get(CacheKind::EarningsCalendar, "AAPL").await.unwrap();
    assert_eq!(date.as_deref(), Some("2024-05-02"));
    assert_eq!(cache.stats().store_hits, 1);
}

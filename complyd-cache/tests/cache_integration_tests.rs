//! Live-Redis facade tests.
//!
//! These tests require a reachable Redis instance and are run with:
//! ```sh
//! REDIS_URL=redis://... cargo test -p complyd-cache --features integration-tests
//! ```

#![cfg(feature = "integration-tests")]

use complyd_cache::{CategoryRegistry, RedisCache, DATABASE_QUERY, SESSION};
use serde::{Deserialize, Serialize};
use serial_test::serial;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

async fn cache() -> RedisCache {
    // Unique namespace per test run keeps assertions isolated.
    let namespace = format!("complyd-test-{}", uuid::Uuid::new_v4().simple());
    let registry = CategoryRegistry::with_namespace(&namespace);
    RedisCache::connect(&redis_url(), registry)
        .await
        .expect("redis should be reachable")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SessionRecord {
    user_id: String,
    scopes: Vec<String>,
}

#[tokio::test]
#[serial]
async fn set_then_get_round_trips_each_category() {
    let cache = cache().await;
    let record = SessionRecord {
        user_id: "u-123".to_string(),
        scopes: vec!["screening:read".to_string(), "tasks:write".to_string()],
    };

    for category in [DATABASE_QUERY, SESSION, "no-such-category"] {
        assert!(cache.set("round-trip", &record, category, None).await);
        let fetched: Option<SessionRecord> = cache.get("round-trip", category).await;
        assert_eq!(fetched.as_ref(), Some(&record), "category {}", category);
    }
}

#[tokio::test]
#[serial]
async fn get_miss_returns_none_and_counts() {
    let cache = cache().await;
    let missing: Option<SessionRecord> = cache.get("never-set", SESSION).await;
    assert!(missing.is_none());
    let stats = cache.stats().await;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 0);
}

#[tokio::test]
#[serial]
async fn delete_and_exists_agree() {
    let cache = cache().await;
    cache.set("ephemeral", &1u64, SESSION, None).await;
    assert!(cache.exists("ephemeral", SESSION).await);
    assert!(cache.delete("ephemeral", SESSION).await);
    assert!(!cache.exists("ephemeral", SESSION).await);
    assert!(!cache.delete("ephemeral", SESSION).await);
}

#[tokio::test]
#[serial]
async fn get_or_set_fetches_once() {
    let cache = cache().await;
    let fetched = cache
        .get_or_set("expensive", SESSION, None, || async {
            Ok("computed".to_string())
        })
        .await
        .unwrap();
    assert_eq!(fetched, "computed");

    // Second call must come from cache, not the fetcher.
    let fetched = cache
        .get_or_set("expensive", SESSION, None, || async {
            Ok("recomputed".to_string())
        })
        .await
        .unwrap();
    assert_eq!(fetched, "computed");
}

#[tokio::test]
#[serial]
async fn invalidate_pattern_removes_all_and_only_matches() {
    let cache = cache().await;
    for i in 0..250 {
        cache
            .set(&format!("user:{}", i), &i, DATABASE_QUERY, None)
            .await;
    }
    for i in 0..10 {
        cache
            .set(&format!("tenant:{}", i), &i, DATABASE_QUERY, None)
            .await;
    }

    let removed = cache.invalidate_pattern("user:*", DATABASE_QUERY).await;
    assert_eq!(removed, 250);

    assert!(!cache.exists("user:0", DATABASE_QUERY).await);
    assert!(cache.exists("tenant:0", DATABASE_QUERY).await);
}

#[tokio::test]
#[serial]
async fn stats_reflect_metadata_after_sets() {
    let cache = cache().await;
    cache.set("a", &1u64, SESSION, None).await;
    cache.set("b", &2u64, SESSION, None).await;
    // Metadata updates are spawned; give them a moment to land.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let stats = cache.stats().await;
    assert_eq!(stats.sets, 2);
    let usage = stats.categories.get(SESSION).expect("session metadata");
    assert_eq!(usage.entry_count, 2);
    assert!(usage.total_size_bytes > 0);
    assert!(usage.last_updated.is_some());
}

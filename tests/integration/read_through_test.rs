//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了旁路缓存读路径的集成测试。

#[path = "../common/mod.rs"]
mod common;

use common::{setup_logging, FailingStore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tunecache::keys;
use tunecache::serialization::SerializerEnum;
use tunecache::{CacheStore, MemoryStore, ReadThroughCache};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Song {
    id: String,
    title: String,
    plays: u64,
}

fn song(id: &str, plays: u64) -> Song {
    Song {
        id: id.to_string(),
        title: format!("Track {}", id),
        plays,
    }
}

fn memory_cache() -> (MemoryStore, ReadThroughCache) {
    let store = MemoryStore::default();
    let cache = ReadThroughCache::new(Arc::new(store.clone()), SerializerEnum::default());
    (store, cache)
}

#[tokio::test]
async fn test_second_read_is_served_from_cache() {
    setup_logging();
    let (store, cache) = memory_cache();
    let key = keys::song_meta("S1");
    let computed = AtomicUsize::new(0);

    for _ in 0..3 {
        let calls = &computed;
        let value: Song = cache
            .get_or_set(&key, 300, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(song("S1", 10))
            })
            .await
            .unwrap();
        assert_eq!(value, song("S1", 10));
    }

    assert_eq!(computed.load(Ordering::SeqCst), 1);
    assert!(store.get("song:meta:S1").await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    setup_logging();
    let (_store, cache) = memory_cache();
    let key = keys::top_songs();
    let computed = AtomicUsize::new(0);

    let read = |plays: u64| {
        let calls = &computed;
        let cache = &cache;
        let key = &key;
        async move {
            cache
                .get_or_set(key, 300, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(vec![song("S1", plays)])
                })
                .await
                .unwrap()
        }
    };

    assert_eq!(read(1).await[0].plays, 1);
    tokio::time::advance(Duration::from_secs(299)).await;
    assert_eq!(read(2).await[0].plays, 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(read(3).await[0].plays, 3);
    assert_eq!(computed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unavailable_store_falls_through_to_compute() {
    setup_logging();
    let store = Arc::new(FailingStore::default());
    let cache = ReadThroughCache::new(store.clone(), SerializerEnum::default());
    let key = keys::album_meta("AL1");

    let value: Song = cache
        .get_or_set(&key, 300, || async { Ok::<_, String>(song("AL1", 0)) })
        .await
        .unwrap();
    assert_eq!(value, song("AL1", 0));
    // 只尝试读取，不回写
    assert_eq!(store.calls(), 1);

    assert!(cache.get::<Song>(&key).await.is_none());
    let stored = cache.set(&key, &value, 300).await;
    assert!(!stored.is_stored());
    assert!(stored.error().is_some_and(|e| e.is_unavailable()));
    assert!(!cache.delete(&key).await.is_stored());

    let report = cache.delete_by_pattern("album:*").await;
    assert!(report.interrupted);
    assert_eq!(report.deleted, 0);
}

/// 过期时间不可用时只放弃回写，读路径照常返回计算结果
#[tokio::test]
async fn test_unusable_ttl_skips_write_back() {
    setup_logging();
    let (store, cache) = memory_cache();

    for ttl in [u64::MAX, 0] {
        let value: Vec<String> = cache
            .get_or_set(&keys::home(), ttl, || async {
                Ok::<_, String>(vec!["S1".to_string()])
            })
            .await
            .unwrap();
        assert_eq!(value, vec!["S1".to_string()]);
        assert!(store.is_empty().await);

        let stored = cache.set(&keys::home(), &value, ttl).await;
        assert!(stored.error().is_some_and(|e| e.is_unavailable()));
    }
}

#[tokio::test]
async fn test_corrupt_entry_is_treated_as_miss_and_overwritten() {
    setup_logging();
    let (store, cache) = memory_cache();
    let key = keys::song_meta("S9");

    store
        .set(key.as_str(), vec![0xff, 0x00, 0x13], 300)
        .await
        .unwrap();

    let value: Song = cache
        .get_or_set(&key, 300, || async { Ok::<_, String>(song("S9", 4)) })
        .await
        .unwrap();
    assert_eq!(value, song("S9", 4));
    assert_eq!(cache.get::<Song>(&key).await, Some(song("S9", 4)));
}

#[tokio::test]
async fn test_compute_error_is_returned_and_nothing_is_cached() {
    setup_logging();
    let (store, cache) = memory_cache();
    let key = keys::search("lofi");

    let result: Result<Vec<Song>, String> = cache
        .get_or_set(&key, 300, || async { Err("database down".to_string()) })
        .await;
    assert_eq!(result.unwrap_err(), "database down");
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_misses_each_compute() {
    setup_logging();
    let (_store, cache) = memory_cache();
    let key = keys::home();
    let computed = AtomicUsize::new(0);

    let load = |marker: u64| {
        let calls = &computed;
        let cache = &cache;
        let key = &key;
        async move {
            cache
                .get_or_set(key, 300, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, String>(song("H", marker))
                })
                .await
                .unwrap()
        }
    };

    let (first, second) = tokio::join!(load(1), load(2));
    assert_eq!(first.plays, 1);
    assert_eq!(second.plays, 2);
    assert_eq!(computed.load(Ordering::SeqCst), 2);

    // 最后一次写入生效，之后的读取命中其中一个值
    let cached = cache.get::<Song>(&key).await.unwrap();
    assert!(cached.plays == 1 || cached.plays == 2);
}

#[tokio::test]
async fn test_delete_by_pattern_only_touches_matching_keys() {
    setup_logging();
    let store = MemoryStore::new(2);
    let cache = ReadThroughCache::new(Arc::new(store.clone()), SerializerEnum::default());

    for page in 1..=5 {
        cache
            .set(&keys::song_list(page, 20, Some("U1")), &Vec::<Song>::new(), 300)
            .await;
    }
    cache.set(&keys::song_meta("S1"), &song("S1", 1), 300).await;

    let report = cache.delete_by_pattern("songs:list:*").await;
    assert_eq!(report.deleted, 5);
    assert!(report.batches >= 3);
    assert!(!report.interrupted);
    assert_eq!(store.len().await, 1);
}

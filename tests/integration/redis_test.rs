//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了Redis后端的集成测试，Redis不可用时跳过。

#[path = "../common/mod.rs"]
mod common;

use common::{generate_unique_name, is_redis_available, redis_url, setup_logging, viewers};
use futures::StreamExt;
use secrecy::SecretString;
use std::time::Duration;
use tokio::time::timeout;
use tunecache::backend::sweep;
use tunecache::config::{BackendType, Config};
use tunecache::keys::CacheKey;
use tunecache::{CacheManager, CacheStore, InvalidationEvent, RedisStore, ResourceKind};

const WAIT: Duration = Duration::from_secs(5);

fn redis_config(channel: &str) -> Config {
    let mut config = Config {
        backend: BackendType::Redis,
        ..Default::default()
    };
    config.redis.url = SecretString::new(redis_url().into());
    config.redis.scan_batch_size = 5;
    config.invalidation.channel = channel.to_string();
    config.invalidation.subscribe = true;
    config
}

#[tokio::test]
async fn test_redis_store_basic_operations() {
    setup_logging();
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }

    let config = redis_config("unused");
    let (store, _connection) = RedisStore::connect(&config.redis).await.unwrap();
    let prefix = generate_unique_name("rt");
    let key = format!("{}:song:meta:S1", prefix);

    store.ping().await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), None);

    store.set(&key, b"{\"id\":\"S1\"}".to_vec(), 120).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(b"{\"id\":\"S1\"}".to_vec()));

    let ttl = store.ttl(&key).await.unwrap();
    assert!(matches!(ttl, Some(t) if t > 0 && t <= 120));

    let deleted = store
        .delete_many(&[CacheKey::from_raw(key.as_str()), CacheKey::from_raw("missing")])
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(store.get(&key).await.unwrap(), None);
    assert_eq!(store.ttl(&key).await.unwrap(), None);
    assert_eq!(store.delete_many(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_redis_sweep_removes_only_matching_keys() {
    setup_logging();
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }

    let config = redis_config("unused");
    let (store, _connection) = RedisStore::connect(&config.redis).await.unwrap();
    let prefix = generate_unique_name("sweep");

    for i in 0..23 {
        store
            .set(&format!("{}:songs:list:U{}:page1:size20", prefix, i), vec![1], 120)
            .await
            .unwrap();
    }
    let survivor = format!("{}:song:meta:S1", prefix);
    store.set(&survivor, vec![1], 120).await.unwrap();

    let pattern = format!("{}:songs:list:*", prefix);
    let mut scanned = 0usize;
    let mut batches = store.scan_keys(&pattern);
    while let Some(batch) = batches.next().await {
        scanned += batch.unwrap().len();
    }
    // SCAN 可能重复返回键，但不会遗漏
    assert!(scanned >= 23);

    let report = sweep(&store, &pattern).await;
    assert_eq!(report.deleted, 23);
    assert!(!report.interrupted);
    assert!(store.get(&survivor).await.unwrap().is_some());

    store.delete(&survivor).await.unwrap();
}

#[tokio::test]
async fn test_redis_bus_delivers_to_other_process() {
    setup_logging();
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }

    let channel = generate_unique_name("cache:invalidate");
    let a = CacheManager::init(redis_config(&channel)).await.unwrap();
    let b = CacheManager::init(redis_config(&channel)).await.unwrap();

    let store = a.store();
    for key in ["song:meta:RS1", "songs:list:RU1:page1:size20"] {
        store.set(key, b"1".to_vec(), 120).await.unwrap();
    }

    let event = a
        .publisher()
        .publish_resource_change(
            ResourceKind::Song,
            Some("RS1"),
            &viewers(&["RU1"]),
            Some("songs:list:RU1:*"),
        )
        .await
        .unwrap();
    assert_eq!(event.pattern.as_deref(), Some("songs:list:RU1:*"));

    timeout(WAIT, b.wait_for_invalidations(1)).await.unwrap();
    timeout(WAIT, a.wait_for_invalidations(1)).await.unwrap();

    assert_eq!(store.get("song:meta:RS1").await.unwrap(), None);
    assert_eq!(store.get("songs:list:RU1:page1:size20").await.unwrap(), None);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_redis_bus_rejects_second_subscription() {
    setup_logging();
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }

    let mut config = redis_config(&generate_unique_name("cache:invalidate"));
    config.invalidation.subscribe = false;
    let manager = CacheManager::init(config).await.unwrap();
    let bus = manager.bus();

    let mut payloads = bus.subscribe().await.unwrap();
    assert!(bus.subscribe().await.is_err());

    let event = InvalidationEvent::new(tunecache::sync::EventType::update(ResourceKind::Home));
    bus.publish(&event).await.unwrap();
    let payload = timeout(WAIT, payloads.next()).await.unwrap().unwrap();
    assert_eq!(InvalidationEvent::decode(&payload).unwrap(), event);

    manager.shutdown().await;
}

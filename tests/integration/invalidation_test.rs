//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了跨进程缓存失效的集成测试。

#[path = "../common/mod.rs"]
mod common;

use common::{setup_logging, viewers, Cluster};
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;
use tunecache::keys;
use tunecache::sync::ChangeAction;
use tunecache::{CacheError, CacheManager, CacheStore, InvalidationBus, InvalidationEvent, ResourceKind};

const WAIT: Duration = Duration::from_secs(5);

async fn seed(store: &dyn CacheStore, raw_keys: &[&str]) {
    for key in raw_keys {
        store
            .set(key, b"\"cached\"".to_vec(), 300)
            .await
            .expect("seed failed");
    }
}

async fn exists(store: &dyn CacheStore, key: &str) -> bool {
    store.get(key).await.expect("get failed").is_some()
}

async fn settle(processes: &[&CacheManager], count: u64) {
    for process in processes {
        timeout(WAIT, process.wait_for_invalidations(count))
            .await
            .expect("subscriber did not catch up");
    }
}

#[tokio::test]
async fn test_song_update_clears_every_dependent_key() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;
    let b = cluster.spawn_process().await;

    seed(
        &cluster.store,
        &[
            "song:meta:S",
            "top:songs",
            "songs:list:U1:page1:size20",
            "songs:list:U2:page1:size20",
            "songs:list:U3:page4:size50",
            "artist:meta:A1",
        ],
    )
    .await;

    let event = a
        .publisher()
        .publish_resource_change(ResourceKind::Song, Some("S"), &viewers(&["U1", "U2"]), None)
        .await
        .unwrap();
    assert_eq!(event.pattern.as_deref(), Some("songs:list:*"));

    settle(&[&a, &b], 1).await;

    for key in [
        "song:meta:S",
        "top:songs",
        "songs:list:U1:page1:size20",
        "songs:list:U2:page1:size20",
        "songs:list:U3:page4:size50",
    ] {
        assert!(!exists(&cluster.store, key).await, "{} should be gone", key);
    }
    assert!(exists(&cluster.store, "artist:meta:A1").await);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_updater_invalidate_clears_song_keys() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;
    let b = cluster.spawn_process().await;

    let dependent = [
        "song:meta:S",
        "top:songs",
        "songs:list:U1:page1:size20",
        "songs:list:U2:page1:size20",
    ];
    seed(&cluster.store, &dependent).await;
    seed(&cluster.store, &["album:meta:AL1"]).await;

    let outcome = b
        .updater()
        .invalidate(ResourceKind::Song, Some("S"), &viewers(&["U1", "U2"]))
        .await
        .unwrap();
    assert!(outcome.published);
    assert_eq!(outcome.event.action(), ChangeAction::Update);
    assert!(outcome.repopulated.is_empty());

    settle(&[&a, &b], 1).await;

    for key in dependent {
        assert!(!exists(&cluster.store, key).await, "{} should be gone", key);
    }
    assert!(exists(&cluster.store, "album:meta:AL1").await);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_sweep_is_scoped_to_its_namespace() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;

    seed(
        &cluster.store,
        &[
            "album:list:U1:page1:size20",
            "album:list:guest:page2:size20",
            "songs:list:U1:page1:size20",
            "artists:list:U1:page1:size20",
        ],
    )
    .await;

    a.publisher()
        .publish_resource_change(ResourceKind::Album, Some("AL1"), &[], None)
        .await
        .unwrap();
    settle(&[&a], 1).await;

    assert!(!exists(&cluster.store, "album:list:U1:page1:size20").await);
    assert!(!exists(&cluster.store, "album:list:guest:page2:size20").await);
    assert!(exists(&cluster.store, "songs:list:U1:page1:size20").await);
    assert!(exists(&cluster.store, "artists:list:U1:page1:size20").await);

    a.shutdown().await;
}

#[tokio::test]
async fn test_explicit_pattern_limits_favorite_sweep_to_one_viewer() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;

    seed(
        &cluster.store,
        &[
            "favorite:list:U1:page1:size20",
            "favorite:list:U1:page2:size20",
            "favorite:list:U2:page1:size20",
        ],
    )
    .await;

    let pattern = keys::list_pattern(keys::KeyKind::FavoriteList, Some("U1")).unwrap();
    a.publisher()
        .publish_resource_change(ResourceKind::Favorite, None, &[], Some(&pattern))
        .await
        .unwrap();
    settle(&[&a], 1).await;

    assert!(!exists(&cluster.store, "favorite:list:U1:page1:size20").await);
    assert!(!exists(&cluster.store, "favorite:list:U1:page2:size20").await);
    assert!(exists(&cluster.store, "favorite:list:U2:page1:size20").await);

    a.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_kind_is_rejected_before_publishing() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;

    let listener = cluster.bus.connect();
    let mut payloads = listener.subscribe().await.unwrap();

    let result = a
        .publisher()
        .publish_named("playlist", Some("P1"), &[], None)
        .await;
    assert!(matches!(result, Err(CacheError::UnsupportedResource(_))));

    let result = a
        .updater()
        .update_named("playlist", Some("P1"), &[], Some(&json!({"name": "x"})))
        .await;
    assert!(matches!(result, Err(CacheError::UnsupportedResource(_))));

    // 之后的第一条消息必须是这条合法消息
    a.publisher()
        .publish_named("home", None, &[], None)
        .await
        .unwrap();
    let payload = timeout(WAIT, payloads.next()).await.unwrap().unwrap();
    let event = InvalidationEvent::decode(&payload).unwrap();
    assert_eq!(event.kind(), ResourceKind::Home);

    a.shutdown().await;
}

#[tokio::test]
async fn test_artist_refresh_keeps_new_value_and_clears_lists() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;
    let b = cluster.spawn_process().await;

    seed(
        &cluster.store,
        &[
            "artist:meta:A1",
            "artists:list:U1:page1:size20",
            "artists:list:guest:page3:size20",
        ],
    )
    .await;

    let renamed = json!({"id": "A1", "name": "New Name"});
    let outcome = a
        .updater()
        .update_resource(ResourceKind::Artist, Some("A1"), &viewers(&["U1"]), Some(&renamed))
        .await
        .unwrap();

    assert!(outcome.published);
    assert_eq!(outcome.event.action(), ChangeAction::Refresh);
    assert_eq!(outcome.repopulated, vec![keys::artist_meta("A1")]);
    assert!(!outcome.event.keys.contains(&keys::artist_meta("A1")));

    settle(&[&a, &b], 1).await;

    assert!(!exists(&cluster.store, "artists:list:U1:page1:size20").await);
    assert!(!exists(&cluster.store, "artists:list:guest:page3:size20").await);

    let ttl = cluster.store.ttl("artist:meta:A1").await.unwrap();
    assert!(matches!(ttl, Some(t) if t > 300 && t <= 3600));

    // 另一个进程的读路径直接命中新值
    let value: serde_json::Value = b
        .cache()
        .get_or_set(&keys::artist_meta("A1"), 3600, || async {
            Err::<serde_json::Value, String>("should not compute".to_string())
        })
        .await
        .unwrap();
    assert_eq!(value, renamed);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_delete_removes_canonical_key() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;

    seed(&cluster.store, &["album:meta:AL7", "album:list:U1:page1:size20"]).await;

    let outcome = a
        .updater()
        .delete_resource(ResourceKind::Album, Some("AL7"), &viewers(&["U1"]))
        .await
        .unwrap();
    assert!(outcome.published);
    assert_eq!(outcome.event.action(), ChangeAction::Delete);

    settle(&[&a], 1).await;
    assert!(!exists(&cluster.store, "album:meta:AL7").await);
    assert!(!exists(&cluster.store, "album:list:U1:page1:size20").await);

    a.shutdown().await;
}

#[tokio::test]
async fn test_malformed_message_is_dropped_and_processing_continues() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;

    seed(&cluster.store, &["home"]).await;

    a.bus().publish_raw(b"not json".to_vec()).await.unwrap();
    a.bus()
        .publish_raw(br#"{"type":"playlist:update","keys":[]}"#.to_vec())
        .await
        .unwrap();
    a.publisher()
        .publish_resource_change(ResourceKind::Home, None, &[], None)
        .await
        .unwrap();

    settle(&[&a], 3).await;
    assert_eq!(a.subscriber().unwrap().processed(), 3);
    assert!(!exists(&cluster.store, "home").await);

    a.shutdown().await;
}

#[tokio::test]
async fn test_events_from_one_publisher_arrive_in_order() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;

    let listener = cluster.bus.connect();
    let mut payloads = listener.subscribe().await.unwrap();

    let ids: Vec<String> = (0..20).map(|i| format!("S{}", i)).collect();
    for id in &ids {
        a.publisher()
            .publish_resource_change(ResourceKind::Song, Some(id.as_str()), &[], None)
            .await
            .unwrap();
    }

    let mut received = Vec::new();
    while received.len() < ids.len() {
        let payload = timeout(WAIT, payloads.next()).await.unwrap().unwrap();
        let event = InvalidationEvent::decode(&payload).unwrap();
        assert_eq!(event.origin.as_deref(), Some(a.publisher().origin()));
        received.push(event.resource_id.unwrap());
    }
    assert_eq!(received, ids);

    a.shutdown().await;
}

#[tokio::test]
async fn test_second_subscription_is_rejected() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;

    let result = a.bus().subscribe().await;
    assert!(matches!(result, Err(CacheError::AlreadySubscribed(_))));

    a.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_processing() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;
    let b = cluster.spawn_process().await;

    b.shutdown().await;
    seed(&cluster.store, &["top:songs"]).await;

    a.publisher()
        .publish_resource_change(ResourceKind::TopSongs, None, &[], None)
        .await
        .unwrap();
    settle(&[&a], 1).await;

    assert!(!exists(&cluster.store, "top:songs").await);
    assert_eq!(b.subscriber().unwrap().processed(), 0);

    a.shutdown().await;
}

/// 单线程运行时下连续发布大量消息，订阅者落后时也不能丢失
#[tokio::test(flavor = "current_thread")]
async fn test_burst_of_changes_reaches_a_slow_subscriber() {
    setup_logging();
    let cluster = Cluster::new();
    let a = cluster.spawn_process().await;

    let queries: Vec<String> = (0..1100).map(|i| format!("q{}", i)).collect();
    for query in &queries {
        cluster
            .store
            .set(keys::search(query).as_str(), b"[]".to_vec(), 300)
            .await
            .unwrap();
    }

    for query in &queries {
        a.publisher()
            .publish_resource_change(ResourceKind::Search, Some(query.as_str()), &[], None)
            .await
            .unwrap();
    }

    settle(&[&a], queries.len() as u64).await;
    assert_eq!(a.subscriber().unwrap().processed(), queries.len() as u64);
    assert!(cluster.store.is_empty().await);

    a.shutdown().await;
}

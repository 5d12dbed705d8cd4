//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 跨实例同步总线集成测试，使用进程内广播

#[path = "../common/mod.rs"]
mod common;

use cachepool::client::CacheExt;
use cachepool::metrics::GLOBAL_METRICS;
use cachepool::sync::SyncMessage;
use cachepool::{
    CachePool, CacheValue, Expiration, LocalCache, MemoryBroker, SyncPublisher, SyncTransport,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

fn pool() -> CachePool {
    let cache = LocalCache::builder()
        .name(common::generate_unique_service_name("pool"))
        .default_expiration(Some(Duration::from_secs(300)))
        .cleanup_interval(Duration::from_secs(60))
        .sticky_interval(Duration::from_millis(50))
        .build()
        .expect("Failed to create cache");
    CachePool::new(Arc::new(cache))
}

async fn wait_for_value(pool: &CachePool, key: &str, expected: &CacheValue) -> bool {
    common::wait_until(Duration::from_secs(2), || {
        let done = pool.cache().get(key).as_ref() == Some(expected);
        async move { done }
    })
    .await
}

#[tokio::test]
async fn test_write_reaches_every_instance() {
    common::setup_logging();
    let broker = Arc::new(MemoryBroker::new());
    let transport: Arc<dyn SyncTransport> = broker.clone();

    let a = pool();
    let b = pool();
    a.use_sync(transport.clone(), "queue-a").await.unwrap();
    b.use_sync(transport.clone(), "queue-b").await.unwrap();
    assert_eq!(broker.queue_count(), 2);

    let publisher = SyncPublisher::new(transport);
    let expected = CacheValue::from("7421");
    publisher
        .publish(
            "code123",
            &expected,
            Expiration::After(Duration::from_secs(300)),
        )
        .await
        .unwrap();

    assert!(wait_for_value(&a, "code123", &expected).await);
    assert!(wait_for_value(&b, "code123", &expected).await);

    let (_, expires_at) = b.cache().get_with_expiration("code123").unwrap();
    assert!(expires_at.is_some());

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn test_repeated_delivery_is_idempotent() {
    let broker = Arc::new(MemoryBroker::new());
    let transport: Arc<dyn SyncTransport> = broker.clone();
    let p = pool();
    p.use_sync(transport.clone(), "queue-idem").await.unwrap();

    let payload = SyncMessage::new("k", &CacheValue::from("v"), Expiration::Never)
        .encode()
        .unwrap();
    for _ in 0..3 {
        transport.publish(&payload).await.unwrap();
    }
    transport.publish(r#"{"key":"done","value":1,"ttl":-1}"#).await.unwrap();

    assert!(wait_for_value(&p, "done", &CacheValue::from(1i64)).await);
    assert_eq!(p.cache().get("k"), Some(CacheValue::from("v")));
    assert_eq!(p.cache().item_count(), 2);

    p.close().await;
}

#[tokio::test]
async fn test_malformed_message_is_skipped() {
    let broker = Arc::new(MemoryBroker::new());
    let transport: Arc<dyn SyncTransport> = broker.clone();
    let p = pool();
    p.use_sync(transport.clone(), "queue-malformed").await.unwrap();

    transport.publish("not json at all").await.unwrap();
    transport.publish(r#"{"key":"k"}"#).await.unwrap();
    transport
        .publish(r#"{"key":"after","value":"ok","ttl":0}"#)
        .await
        .unwrap();

    assert!(wait_for_value(&p, "after", &CacheValue::from("ok")).await);
    assert_eq!(p.sync_count(), 1);
    assert!(GLOBAL_METRICS.sync_count("queue-malformed", "decode_error") >= 2);

    p.close().await;
}

#[derive(Debug, PartialEq, Deserialize)]
struct Session {
    user: String,
    roles: Vec<String>,
}

#[tokio::test]
async fn test_structured_values_arrive_untyped() {
    let broker = Arc::new(MemoryBroker::new());
    let transport: Arc<dyn SyncTransport> = broker.clone();
    let p = pool();
    p.use_sync(transport.clone(), "queue-json").await.unwrap();

    let session = serde_json::json!({"user": "bob", "roles": ["admin"]});
    SyncPublisher::new(transport)
        .publish("session", &CacheValue::Json(session.clone()), Expiration::Default)
        .await
        .unwrap();

    assert!(wait_for_value(&p, "session", &CacheValue::Json(session)).await);

    let typed: Option<Session> = p.cache().get_as("session").await.unwrap();
    assert_eq!(
        typed,
        Some(Session {
            user: "bob".to_string(),
            roles: vec!["admin".to_string()],
        })
    );

    p.close().await;
}

#[tokio::test]
async fn test_numbers_lose_concrete_width() {
    let broker = Arc::new(MemoryBroker::new());
    let transport: Arc<dyn SyncTransport> = broker.clone();
    let p = pool();
    p.use_sync(transport.clone(), "queue-width").await.unwrap();

    SyncPublisher::new(transport)
        .publish("n", &CacheValue::from(7u8), Expiration::Default)
        .await
        .unwrap();

    assert!(wait_for_value(&p, "n", &CacheValue::from(7i64)).await);
    p.cache().increment("n", 1).unwrap();
    assert_eq!(p.cache().get("n"), Some(CacheValue::from(8i64)));

    p.close().await;
}

#[tokio::test]
async fn test_stop_sync_halts_delivery() {
    let broker = Arc::new(MemoryBroker::new());
    let transport: Arc<dyn SyncTransport> = broker.clone();
    let p = pool();
    p.use_sync(transport.clone(), "queue-stop").await.unwrap();
    assert_eq!(p.sync_count(), 1);

    p.stop_sync().await;
    assert_eq!(p.sync_count(), 0);

    let publisher = SyncPublisher::new(transport.clone());
    publisher
        .publish("late", &CacheValue::from("x"), Expiration::Default)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(p.cache().get("late"), None);

    // 同名队列重新绑定后取回停止期间积压的消息
    p.use_sync(transport, "queue-stop").await.unwrap();
    assert!(wait_for_value(&p, "late", &CacheValue::from("x")).await);

    p.close().await;
}

#[tokio::test]
async fn test_sync_overwrites_mirrored_entry() {
    let broker = Arc::new(MemoryBroker::new());
    let transport: Arc<dyn SyncTransport> = broker.clone();
    let p = pool();
    p.cache().set("cfg", "old".into(), Expiration::Never);
    let mirrored = common::wait_until(Duration::from_secs(2), || {
        let done = p.cache().mirror().map(|m| m.contains("cfg")) == Some(true);
        async move { done }
    })
    .await;
    assert!(mirrored);

    p.use_sync(transport.clone(), "queue-mirror").await.unwrap();
    SyncPublisher::new(transport)
        .publish("cfg", &CacheValue::from("new"), Expiration::Never)
        .await
        .unwrap();

    assert!(wait_for_value(&p, "cfg", &CacheValue::from("new")).await);

    p.close().await;
}

#[tokio::test]
async fn test_closed_broker_ends_consumers() {
    let broker = Arc::new(MemoryBroker::new());
    let transport: Arc<dyn SyncTransport> = broker.clone();
    let p = pool();
    p.use_sync(transport, "queue-closed").await.unwrap();

    broker.close();
    let finished = common::wait_until(Duration::from_secs(2), || {
        let done = p.sync_count() == 0;
        async move { done }
    })
    .await;
    assert!(finished);

    p.close().await;
}

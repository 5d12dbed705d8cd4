//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! Redis集成测试：全局层、基于Redis的分层缓存与同步总线
//! Redis不可用时跳过

#[path = "../common/mod.rs"]
mod common;

use cachepool::backend::RedisBackend;
use cachepool::config::{Config, RedisConfig};
use cachepool::sync::RedisStreamTransport;
use cachepool::{
    CacheError, CacheManager, CacheOps, CachePool, CacheValue, Expiration, LocalCache, RedisCache,
    SyncPublisher, SyncTransport, TieredCache,
};
use common::{generate_unique_service_name, is_redis_available, redis_url, setup_logging};
use secrecy::SecretString;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn redis_config(namespace: &str) -> RedisConfig {
    RedisConfig {
        connection_string: SecretString::from(redis_url()),
        namespace: namespace.to_string(),
        ..Default::default()
    }
}

async fn redis_cache(default_ttl: Option<Duration>) -> RedisCache {
    let namespace = generate_unique_service_name("it");
    RedisCache::connect("global", &redis_config(&namespace), default_ttl)
        .await
        .expect("Failed to connect to Redis")
}

#[tokio::test]
#[serial]
async fn test_redis_backend_ping_and_namespace() {
    setup_logging();
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }

    let backend = RedisBackend::connect(&redis_config("ns_ping")).await.unwrap();
    backend.ping().await.unwrap();
    assert_eq!(backend.namespace(), "ns_ping");
}

#[tokio::test]
#[serial]
async fn test_redis_cache_basic_operations() {
    setup_logging();
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }

    let cache = redis_cache(Some(Duration::from_secs(60))).await;

    cache.set("text", "hello".into(), Expiration::Default).await.unwrap();
    cache
        .set("blob", vec![0u8, 1, 2, 255].into(), Expiration::Never)
        .await
        .unwrap();
    cache
        .set(
            "json",
            CacheValue::Json(serde_json::json!({"a": [1, 2]})),
            Expiration::Default,
        )
        .await
        .unwrap();

    assert_eq!(cache.get("text").await.unwrap(), Some(CacheValue::from("hello")));
    assert_eq!(
        cache.get("blob").await.unwrap(),
        Some(CacheValue::from(vec![0u8, 1, 2, 255]))
    );
    assert_eq!(
        cache.get("json").await.unwrap(),
        Some(CacheValue::Json(serde_json::json!({"a": [1, 2]})))
    );
    assert_eq!(cache.get("missing").await.unwrap(), None);

    let (_, text_exp) = cache.get_with_expiration("text").await.unwrap().unwrap();
    assert!(text_exp.is_some());
    let (_, blob_exp) = cache.get_with_expiration("blob").await.unwrap().unwrap();
    assert!(blob_exp.is_none());

    assert_eq!(cache.item_count().await.unwrap(), 3);
    let items = cache.items().await.unwrap();
    assert_eq!(items.len(), 3);
    assert!(items["blob"].expires_at.is_none());

    cache.delete("text").await.unwrap();
    cache.delete("text").await.unwrap();
    assert_eq!(cache.get("text").await.unwrap(), None);

    cache.flush().await.unwrap();
    assert_eq!(cache.item_count().await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_redis_cache_add_replace() {
    setup_logging();
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }

    let cache = redis_cache(None).await;
    cache.add("k", "v".into(), Expiration::Default).await.unwrap();
    assert!(matches!(
        cache.add("k", "v2".into(), Expiration::Default).await,
        Err(CacheError::AlreadyExists(_))
    ));
    assert!(matches!(
        cache.replace("absent", "v".into(), Expiration::Default).await,
        Err(CacheError::NotFound(_))
    ));
    cache
        .replace("k", "v3".into(), Expiration::After(Duration::from_millis(200)))
        .await
        .unwrap();
    assert_eq!(cache.get("k").await.unwrap(), Some(CacheValue::from("v3")));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(cache.get("k").await.unwrap(), None);
    cache.add("k", "again".into(), Expiration::Default).await.unwrap();

    cache.flush().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_redis_counters() {
    setup_logging();
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }

    let cache = redis_cache(None).await;
    cache.set("n", 5i32.into(), Expiration::Never).await.unwrap();
    cache.increment("n", 10).await.unwrap();
    cache.decrement("n", 3).await.unwrap();
    // 远端只保存十进制文本，读回时宽度为 i64
    assert_eq!(cache.get("n").await.unwrap(), Some(CacheValue::from(12i64)));

    assert!(matches!(
        cache.increment("missing", 1).await,
        Err(CacheError::NotFound(_))
    ));

    cache.set("text", "abc".into(), Expiration::Never).await.unwrap();
    assert!(matches!(
        cache.increment("text", 1).await,
        Err(CacheError::TypeMismatch(_))
    ));

    // 远端计数只支持整数
    cache.set("ratio", 1.5f64.into(), Expiration::Never).await.unwrap();
    assert!(matches!(
        cache.increment("ratio", 1).await,
        Err(CacheError::TypeMismatch(_))
    ));
    assert_eq!(cache.get("ratio").await.unwrap(), Some(CacheValue::from(1.5f64)));

    cache.flush().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_tiered_cache_over_redis() {
    setup_logging();
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }

    let global = Arc::new(redis_cache(Some(Duration::from_secs(60))).await);
    let local = Arc::new(
        LocalCache::builder()
            .name("tiered-local")
            .default_expiration(Some(Duration::from_secs(30)))
            .build()
            .unwrap(),
    );
    let tiered = TieredCache::builder()
        .name("tiered")
        .local(local.clone())
        .global(global.clone())
        .build()
        .unwrap();

    tiered.set_default("user:1", "alice".into()).await.unwrap();
    assert!(local.get("user:1").is_none());
    assert_eq!(
        tiered.get("user:1").await.unwrap(),
        Some(CacheValue::from("alice"))
    );
    assert_eq!(local.get("user:1"), Some(CacheValue::from("alice")));

    // 其他实例直接改写全局层后，本实例在本地副本过期前仍读到旧值
    global.set("user:1", "bob".into(), Expiration::Default).await.unwrap();
    assert_eq!(
        tiered.get("user:1").await.unwrap(),
        Some(CacheValue::from("alice"))
    );

    tiered.set_default("user:1", "carol".into()).await.unwrap();
    assert_eq!(
        tiered.get("user:1").await.unwrap(),
        Some(CacheValue::from("carol"))
    );

    tiered.flush().await.unwrap();
    assert_eq!(global.item_count().await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_redis_stream_fanout() {
    setup_logging();
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }

    let transport: Arc<dyn SyncTransport> = Arc::new(
        RedisStreamTransport::connect(&redis_url(), 1000, 200)
            .await
            .unwrap(),
    );

    let a = CachePool::new(Arc::new(LocalCache::new(None, Duration::ZERO, Duration::ZERO).unwrap()));
    let b = CachePool::new(Arc::new(LocalCache::new(None, Duration::ZERO, Duration::ZERO).unwrap()));
    a.use_sync(transport.clone(), &generate_unique_service_name("queue_a"))
        .await
        .unwrap();
    b.use_sync(transport.clone(), &generate_unique_service_name("queue_b"))
        .await
        .unwrap();

    let key = generate_unique_service_name("code");
    SyncPublisher::new(transport)
        .publish(
            &key,
            &CacheValue::from("7421"),
            Expiration::After(Duration::from_secs(300)),
        )
        .await
        .unwrap();

    for pool in [&a, &b] {
        let arrived = common::wait_until(Duration::from_secs(5), || {
            let done = pool.cache().get(&key) == Some(CacheValue::from("7421"));
            async move { done }
        })
        .await;
        assert!(arrived, "message should reach every queue");
    }

    a.close().await;
    b.close().await;
}

#[tokio::test]
#[serial]
async fn test_manager_with_redis_services() {
    setup_logging();
    if !is_redis_available().await {
        println!("跳过测试: Redis不可用");
        return;
    }

    let namespace = generate_unique_service_name("mgr");
    let toml = format!(
        r#"
        [global]
        default_ttl_secs = 60
        cleanup_interval_secs = 120
        sticky_interval_secs = 60

        [services.orders.redis]
        connection_string = "{url}"
        namespace = "{ns}"

        [services.orders.sync]
        queue = "{queue}"
        block_ms = 200
        "#,
        url = redis_url(),
        ns = namespace,
        queue = generate_unique_service_name("orders"),
    );
    let config = Config::parse(&toml).unwrap();
    let manager = CacheManager::from_config(&config).await.unwrap();
    let service = manager.service("orders").unwrap();
    assert!(service.tiered().is_some());
    assert_eq!(service.pool().sync_count(), 1);

    service
        .ops()
        .set("order:1", "pending".into(), Expiration::Default)
        .await
        .unwrap();
    assert_eq!(
        service.ops().get("order:1").await.unwrap(),
        Some(CacheValue::from("pending"))
    );

    service
        .publish("order:2", &CacheValue::from("shipped"), Expiration::Default)
        .await
        .unwrap();
    let arrived = common::wait_until(Duration::from_secs(5), || {
        let done = service.local().get("order:2") == Some(CacheValue::from("shipped"));
        async move { done }
    })
    .await;
    assert!(arrived);

    service.ops().flush().await.unwrap();
    manager.shutdown().await;
}

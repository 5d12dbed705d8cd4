//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 分层缓存集成测试，全局层以本地缓存代替

#[path = "../common/mod.rs"]
mod common;

use cachepool::client::CacheExt;
use cachepool::{CacheError, CacheOps, CacheValue, Expiration, LocalCache, TieredCache};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

struct Tiers {
    local: Arc<LocalCache>,
    global: Arc<LocalCache>,
    tiered: TieredCache,
}

fn tiers() -> Tiers {
    let local = Arc::new(
        LocalCache::builder()
            .name("local")
            .default_expiration(Some(Duration::from_secs(60)))
            .build()
            .unwrap(),
    );
    let global = Arc::new(
        LocalCache::builder()
            .name("global")
            .default_expiration(Some(Duration::from_secs(600)))
            .build()
            .unwrap(),
    );
    let tiered = TieredCache::builder()
        .name(common::generate_unique_service_name("tiered"))
        .local(local.clone())
        .global(global.clone())
        .build()
        .unwrap();
    Tiers {
        local,
        global,
        tiered,
    }
}

#[tokio::test]
async fn test_read_populates_local_with_default_expiration() {
    common::setup_logging();
    let t = tiers();
    t.global.set("k", "v".into(), Expiration::Never);

    let (value, expires_at) = t.tiered.get_with_expiration("k").await.unwrap().unwrap();
    assert_eq!(value, CacheValue::from("v"));
    assert!(expires_at.is_none());

    // 本地副本使用本地层的默认过期时间，而不是全局层的
    let (_, local_expiry) = t.local.get_with_expiration("k").unwrap();
    assert!(local_expiry.is_some());
}

#[tokio::test]
async fn test_local_hit_does_not_consult_global() {
    let t = tiers();
    t.local.set("k", "stale".into(), Expiration::Default);
    t.global.set("k", "fresh".into(), Expiration::Default);

    assert_eq!(t.tiered.get("k").await.unwrap(), Some(CacheValue::from("stale")));
}

#[tokio::test]
async fn test_writes_invalidate_local_copy() {
    let t = tiers();
    t.global.set("k", "v1".into(), Expiration::Default);
    assert_eq!(t.tiered.get("k").await.unwrap(), Some(CacheValue::from("v1")));
    assert!(t.local.get("k").is_some());

    t.tiered
        .replace("k", "v2".into(), Expiration::Default)
        .await
        .unwrap();
    assert!(t.local.get("k").is_none());
    assert_eq!(t.tiered.get("k").await.unwrap(), Some(CacheValue::from("v2")));

    t.tiered.delete("k").await.unwrap();
    assert!(t.local.get("k").is_none());
    assert!(t.global.get("k").is_none());
    assert_eq!(t.tiered.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_counters_go_to_global() {
    let t = tiers();
    t.tiered
        .set("hits", 10i64.into(), Expiration::Default)
        .await
        .unwrap();
    assert_eq!(t.tiered.get("hits").await.unwrap(), Some(CacheValue::from(10i64)));

    t.tiered.increment("hits", 5).await.unwrap();
    assert!(t.local.get("hits").is_none());
    assert_eq!(t.global.get("hits"), Some(CacheValue::from(15i64)));

    t.tiered.decrement("hits", 3).await.unwrap();
    assert_eq!(t.tiered.get("hits").await.unwrap(), Some(CacheValue::from(12i64)));

    assert!(matches!(
        t.tiered.increment("absent", 1).await,
        Err(CacheError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_add_and_replace_follow_global_state() {
    let t = tiers();
    // 本地层有而全局层没有时，add 仍然成功
    t.local.set("k", "local-only".into(), Expiration::Default);
    t.tiered.add("k", "v".into(), Expiration::Default).await.unwrap();
    assert!(t.local.get("k").is_none());

    assert!(matches!(
        t.tiered.add("k", "again".into(), Expiration::Default).await,
        Err(CacheError::AlreadyExists(_))
    ));
    assert!(matches!(
        t.tiered
            .replace("missing", "v".into(), Expiration::Default)
            .await,
        Err(CacheError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_items_and_flush_reflect_global() {
    let t = tiers();
    t.local.set("only-local", "x".into(), Expiration::Default);
    t.global.set("a", "1".into(), Expiration::Default);
    t.global.set("b", "2".into(), Expiration::Default);

    let items = t.tiered.items().await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(!items.contains_key("only-local"));
    assert_eq!(t.tiered.item_count().await.unwrap(), 2);

    t.tiered.flush().await.unwrap();
    assert_eq!(t.local.item_count(), 0);
    assert_eq!(t.global.item_count(), 0);
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Profile {
    id: u64,
    name: String,
}

#[tokio::test]
async fn test_typed_values_through_tiers() {
    let t = tiers();
    let profile = Profile {
        id: 7,
        name: "alice".to_string(),
    };
    t.tiered
        .set_as("profile:7", &profile, Expiration::Default)
        .await
        .unwrap();

    let loaded: Option<Profile> = t.tiered.get_as("profile:7").await.unwrap();
    assert_eq!(loaded, Some(profile));

    let missing: Option<Profile> = t.tiered.get_as("profile:8").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_default_local_tier_is_created_and_closed() {
    let global = Arc::new(LocalCache::new(None, Duration::ZERO, Duration::ZERO).unwrap());
    let tiered = TieredCache::builder().global(global.clone()).build().unwrap();
    assert_eq!(tiered.name(), "local");

    tiered.set_default("k", "v".into()).await.unwrap();
    assert_eq!(tiered.get("k").await.unwrap(), Some(CacheValue::from("v")));
    assert_eq!(tiered.local().item_count().await.unwrap(), 1);

    tiered.shutdown().await.unwrap();
    // 全局层不受影响
    assert_eq!(global.get("k"), Some(CacheValue::from("v")));
}

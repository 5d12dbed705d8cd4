//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 常驻镜像集成测试

#[path = "../common/mod.rs"]
mod common;

use cachepool::backend::{is_sticky, STICKY_THRESHOLD};
use cachepool::{CacheItem, CacheValue, Expiration, LocalCache};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

fn mirrored_cache(sticky: Duration) -> LocalCache {
    LocalCache::builder()
        .name(common::generate_unique_service_name("sticky"))
        .default_expiration(Some(Duration::from_secs(300)))
        .cleanup_interval(Duration::from_secs(60))
        .sticky_interval(sticky)
        .build()
        .expect("Failed to create cache")
}

async fn wait_mirrored(cache: &LocalCache, key: &str, expected: bool) -> bool {
    common::wait_until(Duration::from_secs(2), || {
        let done = cache.mirror().map(|m| m.contains(key)) == Some(expected);
        async move { done }
    })
    .await
}

#[test]
fn test_threshold_boundary() {
    let now = Utc::now();
    let threshold = chrono::Duration::from_std(STICKY_THRESHOLD).unwrap();

    let at_threshold = CacheItem::new("blob".into(), Some(now + threshold));
    assert!(!is_sticky(&at_threshold, now));

    let past_threshold = CacheItem::new(
        "blob".into(),
        Some(now + threshold + chrono::Duration::seconds(1)),
    );
    assert!(is_sticky(&past_threshold, now));

    for number in [CacheValue::from(1u8), CacheValue::from(2.5f64)] {
        assert!(!is_sticky(&CacheItem::new(number, None), now));
    }

    let bytes = CacheItem::new(CacheValue::from(vec![1u8, 2, 3]), None);
    assert!(is_sticky(&bytes, now));
}

#[tokio::test]
async fn test_long_lived_entries_are_mirrored() {
    common::setup_logging();
    let cache = mirrored_cache(Duration::from_millis(30));

    cache.set("cfg", "v1".into(), Expiration::Never);
    cache.set("day", "v".into(), Expiration::After(Duration::from_secs(86_400)));
    cache.set("short", "v".into(), Expiration::Default);
    cache.set("counter", 1u64.into(), Expiration::Never);

    assert!(wait_mirrored(&cache, "cfg", true).await);
    assert!(wait_mirrored(&cache, "day", true).await);

    let mirror = cache.mirror().unwrap();
    assert!(!mirror.contains("short"));
    assert!(!mirror.contains("counter"));
    assert_eq!(mirror.len(), 2);

    assert_eq!(cache.get("cfg"), Some(CacheValue::from("v1")));
    assert_eq!(cache.get("short"), Some(CacheValue::from("v")));
    assert_eq!(cache.get("counter"), Some(CacheValue::from(1u64)));

    cache.shutdown().await;
}

#[tokio::test]
async fn test_reads_see_latest_write_over_mirror() {
    let cache = mirrored_cache(Duration::from_millis(30));
    cache.set("cfg", "v1".into(), Expiration::Never);
    assert!(wait_mirrored(&cache, "cfg", true).await);

    for round in 0..20 {
        let value = CacheValue::from(format!("v{}", round));
        cache.set("cfg", value.clone(), Expiration::Never);
        assert_eq!(cache.get("cfg"), Some(value));
    }

    // 改为短期条目后立即从镜像中移除
    cache.set("cfg", "brief".into(), Expiration::Default);
    assert_eq!(cache.get("cfg"), Some(CacheValue::from("brief")));
    assert!(wait_mirrored(&cache, "cfg", false).await);

    // 改为数值后同样不再常驻
    cache.set("cfg", "again".into(), Expiration::Never);
    assert!(wait_mirrored(&cache, "cfg", true).await);
    cache.set("cfg", 7i32.into(), Expiration::Never);
    assert_eq!(cache.get("cfg"), Some(CacheValue::from(7i32)));
    assert!(wait_mirrored(&cache, "cfg", false).await);

    cache.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_readers_during_rebuild() {
    let cache = Arc::new(mirrored_cache(Duration::from_millis(5)));
    for i in 0..200 {
        cache.set(&format!("key{}", i), format!("value{}", i).into(), Expiration::Never);
    }

    let mut readers = Vec::new();
    for _ in 0..4 {
        let cache = cache.clone();
        readers.push(tokio::spawn(async move {
            for round in 0..500 {
                let i = round % 200;
                let expected = CacheValue::from(format!("value{}", i));
                assert_eq!(cache.get(&format!("key{}", i)), Some(expected));
                if round % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for reader in readers {
        reader.await.unwrap();
    }

    cache.shutdown().await;
}

#[tokio::test]
async fn test_deleted_entry_not_served_from_mirror() {
    let cache = mirrored_cache(Duration::from_millis(20));
    cache.set("cfg", "v".into(), Expiration::Never);
    assert!(wait_mirrored(&cache, "cfg", true).await);

    let (_, expires_at) = cache.get_with_expiration("cfg").unwrap();
    assert!(expires_at.is_none());

    cache.delete("cfg");
    assert_eq!(cache.get("cfg"), None);
    assert!(cache.get_with_expiration("cfg").is_none());

    cache.shutdown().await;
}

#[tokio::test]
async fn test_loaded_entries_are_visible_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let source = LocalCache::new(None, Duration::ZERO, Duration::ZERO).unwrap();
    source.set("cfg", "saved".into(), Expiration::Never);
    source.save_file(&path).unwrap();

    let cache = mirrored_cache(Duration::from_millis(20));
    cache.load_file(&path).unwrap();
    assert_eq!(cache.get("cfg"), Some(CacheValue::from("saved")));
    assert!(wait_mirrored(&cache, "cfg", true).await);

    cache.shutdown().await;
}

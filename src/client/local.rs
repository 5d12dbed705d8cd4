//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了本地缓存：TTL存储、过期清理任务和可选的常驻镜像。

use super::CacheOps;
use crate::backend::{EvictionCallback, Janitor, MemoryStore, StickyMirror};
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::value::{CacheItem, CacheValue, Expiration, Numeric};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// 本地缓存构建器
pub struct LocalCacheBuilder {
    name: String,
    default_expiration: Option<Duration>,
    cleanup_interval: Duration,
    sticky_interval: Duration,
    on_evicted: Option<EvictionCallback>,
    items: HashMap<String, CacheItem>,
}

impl Default for LocalCacheBuilder {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            default_expiration: None,
            cleanup_interval: Duration::ZERO,
            sticky_interval: Duration::ZERO,
            on_evicted: None,
            items: HashMap::new(),
        }
    }
}

impl LocalCacheBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 默认过期时间，`None` 或零表示默认永不过期
    pub fn default_expiration(mut self, ttl: Option<Duration>) -> Self {
        self.default_expiration = ttl;
        self
    }

    /// 过期清理周期，零表示不启动清理任务
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// 常驻镜像重建周期，零表示不启用常驻镜像
    pub fn sticky_interval(mut self, interval: Duration) -> Self {
        self.sticky_interval = interval;
        self
    }

    pub fn eviction_callback(mut self, callback: EvictionCallback) -> Self {
        self.on_evicted = Some(callback);
        self
    }

    /// 初始条目，例如之前保存的快照
    pub fn items(mut self, items: HashMap<String, CacheItem>) -> Self {
        self.items = items;
        self
    }

    /// 构建本地缓存并启动后台任务
    ///
    /// 常驻镜像重建周期大于清理周期（清理周期非零时）视为配置错误；
    /// 需要后台任务时必须在 tokio 运行时内调用
    pub fn build(self) -> Result<LocalCache> {
        if !self.sticky_interval.is_zero()
            && !self.cleanup_interval.is_zero()
            && self.sticky_interval > self.cleanup_interval
        {
            return Err(CacheError::Configuration(format!(
                "cache {}: sticky interval {:?} must not exceed cleanup interval {:?}",
                self.name, self.sticky_interval, self.cleanup_interval
            )));
        }

        let store = Arc::new(MemoryStore::from_items(
            self.default_expiration,
            self.items,
        ));
        if let Some(callback) = self.on_evicted {
            store.set_eviction_callback(Some(callback));
        }

        let janitor = if self.cleanup_interval.is_zero() {
            None
        } else {
            Some(Janitor::start(
                &self.name,
                store.clone(),
                self.cleanup_interval,
            )?)
        };

        let mirror = if self.sticky_interval.is_zero() {
            None
        } else {
            Some(StickyMirror::start(
                &self.name,
                store.clone(),
                self.sticky_interval,
            )?)
        };

        info!(
            "LocalCache: 创建缓存 {}，default={:?}, cleanup={:?}, sticky={:?}",
            self.name, self.default_expiration, self.cleanup_interval, self.sticky_interval
        );

        Ok(LocalCache {
            name: self.name,
            store,
            janitor,
            mirror,
        })
    }
}

/// 本地缓存
///
/// 所有操作同步执行；`close`/`shutdown` 停止清理任务和常驻镜像
pub struct LocalCache {
    name: String,
    store: Arc<MemoryStore>,
    janitor: Option<Janitor>,
    mirror: Option<StickyMirror>,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("name", &self.name)
            .field("store", &self.store)
            .field("janitor", &self.janitor.is_some())
            .field("mirror", &self.mirror.is_some())
            .finish()
    }
}

impl LocalCache {
    pub fn builder() -> LocalCacheBuilder {
        LocalCacheBuilder::default()
    }

    /// 创建本地缓存
    ///
    /// # 参数
    ///
    /// * `default_expiration` - 默认过期时间
    /// * `cleanup_interval` - 过期清理周期，零表示不清理
    /// * `sticky_interval` - 常驻镜像重建周期，零表示不启用
    pub fn new(
        default_expiration: Option<Duration>,
        cleanup_interval: Duration,
        sticky_interval: Duration,
    ) -> Result<Self> {
        Self::builder()
            .default_expiration(default_expiration)
            .cleanup_interval(cleanup_interval)
            .sticky_interval(sticky_interval)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_expiration(&self) -> Option<Duration> {
        self.store.default_expiration()
    }

    /// 常驻镜像，未启用时为 `None`
    pub fn mirror(&self) -> Option<&StickyMirror> {
        self.mirror.as_ref()
    }

    fn touched(&self, key: &str) {
        if let Some(mirror) = &self.mirror {
            mirror.notify_write(key);
        }
    }

    pub fn set(&self, key: &str, value: CacheValue, exp: Expiration) {
        self.store.set(key, value, exp);
        self.touched(key);
    }

    pub fn set_default(&self, key: &str, value: CacheValue) {
        self.set(key, value, Expiration::Default);
    }

    pub fn add(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        self.store.add(key, value, exp)?;
        self.touched(key);
        Ok(())
    }

    pub fn replace(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        self.store.replace(key, value, exp)?;
        self.touched(key);
        Ok(())
    }

    /// 读取缓存值，常驻镜像命中时不触碰存储的锁
    pub fn get(&self, key: &str) -> Option<CacheValue> {
        if let Some(item) = self.mirror.as_ref().and_then(|m| m.lookup(key)) {
            return Some(item.value);
        }
        self.store.get(key)
    }

    pub fn get_with_expiration(&self, key: &str) -> Option<(CacheValue, Option<DateTime<Utc>>)> {
        if let Some(item) = self.mirror.as_ref().and_then(|m| m.lookup(key)) {
            return Some((item.value, item.expires_at));
        }
        self.store.get_with_expiration(key)
    }

    pub fn increment(&self, key: &str, n: i64) -> Result<()> {
        self.store.increment(key, n)
    }

    pub fn decrement(&self, key: &str, n: i64) -> Result<()> {
        self.store.decrement(key, n)
    }

    pub fn increment_float(&self, key: &str, n: f64) -> Result<()> {
        self.store.increment_float(key, n)
    }

    pub fn decrement_float(&self, key: &str, n: f64) -> Result<()> {
        self.store.decrement_float(key, n)
    }

    /// 指定宽度的自增，存储值宽度不同时返回 `TypeMismatch`
    pub fn increment_as<T: Numeric>(&self, key: &str, n: T) -> Result<T> {
        self.store.increment_as(key, n)
    }

    pub fn decrement_as<T: Numeric>(&self, key: &str, n: T) -> Result<T> {
        self.store.decrement_as(key, n)
    }

    pub fn delete(&self, key: &str) {
        self.store.delete(key);
        self.touched(key);
    }

    pub fn delete_expired(&self) -> usize {
        self.store.delete_expired()
    }

    /// 设置（或移除）淘汰回调
    pub fn on_evicted(&self, callback: Option<EvictionCallback>) {
        self.store.set_eviction_callback(callback);
    }

    pub fn flush(&self) {
        self.store.flush();
        if let Some(mirror) = &self.mirror {
            mirror.notify_flush();
        }
    }

    pub fn items(&self) -> HashMap<String, CacheItem> {
        self.store.items()
    }

    pub fn item_count(&self) -> usize {
        self.store.item_count()
    }

    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        self.store.save(writer)
    }

    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.store.save_file(path)
    }

    /// 读入条目，已存在且未过期的键保持不变
    pub fn load<R: Read>(&self, reader: R) -> Result<()> {
        let keys = self.store.load(reader)?;
        debug!("LocalCache: {} 读入 {} 个条目", self.name, keys.len());
        keys.iter().for_each(|key| self.touched(key));
        Ok(())
    }

    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let keys = self.store.load_file(path)?;
        debug!("LocalCache: {} 读入 {} 个条目", self.name, keys.len());
        keys.iter().for_each(|key| self.touched(key));
        Ok(())
    }

    /// 通知后台任务停止，不等待其退出
    pub fn close(&self) {
        if let Some(janitor) = &self.janitor {
            janitor.stop();
        }
        if let Some(mirror) = &self.mirror {
            mirror.stop();
        }
    }

    /// 停止后台任务并等待其退出
    pub async fn shutdown(&self) {
        if let Some(janitor) = &self.janitor {
            janitor.shutdown().await;
        }
        if let Some(mirror) = &self.mirror {
            mirror.shutdown().await;
        }
        info!("LocalCache: {} 已关闭", self.name);
    }
}

#[async_trait]
impl CacheOps for LocalCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        LocalCache::set(self, key, value, exp);
        Ok(())
    }

    async fn add(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        LocalCache::add(self, key, value, exp)
    }

    async fn replace(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        LocalCache::replace(self, key, value, exp)
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let value = LocalCache::get(self, key);
        let result = if value.is_some() { "hit" } else { "miss" };
        GLOBAL_METRICS.record_request(&self.name, "local", "get", result);
        Ok(value)
    }

    async fn get_with_expiration(
        &self,
        key: &str,
    ) -> Result<Option<(CacheValue, Option<DateTime<Utc>>)>> {
        let entry = LocalCache::get_with_expiration(self, key);
        let result = if entry.is_some() { "hit" } else { "miss" };
        GLOBAL_METRICS.record_request(&self.name, "local", "get", result);
        Ok(entry)
    }

    async fn increment(&self, key: &str, n: i64) -> Result<()> {
        LocalCache::increment(self, key, n)
    }

    async fn decrement(&self, key: &str, n: i64) -> Result<()> {
        LocalCache::decrement(self, key, n)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        LocalCache::delete(self, key);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<()> {
        LocalCache::delete_expired(self);
        Ok(())
    }

    async fn items(&self) -> Result<HashMap<String, CacheItem>> {
        Ok(LocalCache::items(self))
    }

    async fn item_count(&self) -> Result<usize> {
        Ok(LocalCache::item_count(self))
    }

    async fn flush(&self) -> Result<()> {
        LocalCache::flush(self);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        LocalCache::shutdown(self).await;
        Ok(())
    }
}

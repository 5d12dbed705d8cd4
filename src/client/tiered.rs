//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分层缓存：本地层作为全局层的旁路缓存，写入时失效本地层。

use super::{CacheOps, LocalCache};
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::value::{CacheItem, CacheValue, Expiration};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// 未指定本地层时使用的默认参数
const DEFAULT_LOCAL_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_LOCAL_CLEANUP: Duration = Duration::from_secs(30 * 60);

/// 分层缓存构建器
#[derive(Default)]
pub struct TieredCacheBuilder {
    name: Option<String>,
    local: Option<Arc<dyn CacheOps>>,
    global: Option<Arc<dyn CacheOps>>,
}

impl TieredCacheBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 本地层；未指定时创建默认本地缓存（默认过期5分钟，清理周期30分钟，无常驻镜像）
    pub fn local(mut self, local: Arc<dyn CacheOps>) -> Self {
        self.local = Some(local);
        self
    }

    /// 全局层，必填
    pub fn global(mut self, global: Arc<dyn CacheOps>) -> Self {
        self.global = Some(global);
        self
    }

    pub fn build(self) -> Result<TieredCache> {
        let global = self.global.ok_or_else(|| {
            CacheError::Configuration("global cache should be declared".to_string())
        })?;
        let name = self.name.unwrap_or_else(|| global.name().to_string());
        let (local, owns_local) = match self.local {
            Some(local) => (local, false),
            None => {
                let local = LocalCache::builder()
                    .name(format!("{}-local", name))
                    .default_expiration(Some(DEFAULT_LOCAL_TTL))
                    .cleanup_interval(DEFAULT_LOCAL_CLEANUP)
                    .build()?;
                (Arc::new(local) as Arc<dyn CacheOps>, true)
            }
        };
        debug!(
            "TieredCache: 创建 {}，local={}, global={}",
            name,
            local.name(),
            global.name()
        );
        Ok(TieredCache {
            name,
            local,
            global,
            owns_local,
        })
    }
}

/// 分层缓存
///
/// 读：先本地，未命中再全局，全局命中后以默认过期策略回填本地。
/// 写：先写全局，成功后删除本地副本（`set` 无论成败都删除）。
/// `items`/`item_count` 只反映全局层
pub struct TieredCache {
    name: String,
    local: Arc<dyn CacheOps>,
    global: Arc<dyn CacheOps>,
    /// 本地层由本结构创建时，关闭时一并关闭
    owns_local: bool,
}

impl TieredCache {
    pub fn builder() -> TieredCacheBuilder {
        TieredCacheBuilder::default()
    }

    pub fn local(&self) -> &Arc<dyn CacheOps> {
        &self.local
    }

    pub fn global(&self) -> &Arc<dyn CacheOps> {
        &self.global
    }

    async fn invalidate_local(&self, key: &str) {
        if let Err(e) = self.local.delete(key).await {
            warn!("TieredCache: {} 删除本地副本 {} 失败: {}", self.name, key, e);
        }
    }

    async fn populate_local(&self, key: &str, value: CacheValue) {
        if let Err(e) = self.local.set_default(key, value).await {
            warn!("TieredCache: {} 回填本地副本 {} 失败: {}", self.name, key, e);
        }
    }
}

#[async_trait]
impl CacheOps for TieredCache {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn set(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        let result = self.global.set(key, value, exp).await;
        self.invalidate_local(key).await;
        result
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn add(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        self.global.add(key, value, exp).await?;
        self.invalidate_local(key).await;
        Ok(())
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn replace(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        self.global.replace(key, value, exp).await?;
        self.invalidate_local(key).await;
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        if let Some(value) = self.local.get(key).await? {
            GLOBAL_METRICS.record_request(&self.name, "tiered", "get", "local_hit");
            return Ok(Some(value));
        }
        match self.global.get(key).await? {
            Some(value) => {
                GLOBAL_METRICS.record_request(&self.name, "tiered", "get", "global_hit");
                self.populate_local(key, value.clone()).await;
                Ok(Some(value))
            }
            None => {
                GLOBAL_METRICS.record_request(&self.name, "tiered", "get", "miss");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn get_with_expiration(
        &self,
        key: &str,
    ) -> Result<Option<(CacheValue, Option<DateTime<Utc>>)>> {
        if let Some(entry) = self.local.get_with_expiration(key).await? {
            return Ok(Some(entry));
        }
        match self.global.get_with_expiration(key).await? {
            Some((value, expires_at)) => {
                self.populate_local(key, value.clone()).await;
                Ok(Some((value, expires_at)))
            }
            None => Ok(None),
        }
    }

    async fn increment(&self, key: &str, n: i64) -> Result<()> {
        self.global.increment(key, n).await?;
        self.invalidate_local(key).await;
        Ok(())
    }

    async fn decrement(&self, key: &str, n: i64) -> Result<()> {
        self.global.decrement(key, n).await?;
        self.invalidate_local(key).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let global = self.global.delete(key).await;
        let local = self.local.delete(key).await;
        global.and(local)
    }

    async fn delete_expired(&self) -> Result<()> {
        let global = self.global.delete_expired().await;
        let local = self.local.delete_expired().await;
        global.and(local)
    }

    async fn items(&self) -> Result<HashMap<String, CacheItem>> {
        self.global.items().await
    }

    async fn item_count(&self) -> Result<usize> {
        self.global.item_count().await
    }

    async fn flush(&self) -> Result<()> {
        let global = self.global.flush().await;
        let local = self.local.flush().await;
        global.and(local)
    }

    /// 只关闭自己创建的本地层，全局层由调用方管理
    async fn shutdown(&self) -> Result<()> {
        if self.owns_local {
            self.local.shutdown().await?;
        }
        Ok(())
    }
}

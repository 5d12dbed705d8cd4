//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存客户端的接口和实现。

pub mod global;
pub mod local;
pub mod tiered;

use crate::error::{CacheError, Result};
use crate::value::{CacheItem, CacheValue, Expiration};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use tracing::instrument;

pub use global::RedisCache;
pub use local::{LocalCache, LocalCacheBuilder};
pub use tiered::{TieredCache, TieredCacheBuilder};

/// 缓存操作特征
///
/// 本地缓存、全局缓存和分层缓存共享的能力集合，语义与本地TTL存储一致
#[async_trait]
pub trait CacheOps: Send + Sync {
    /// 缓存名称，用于日志和指标
    fn name(&self) -> &str;

    /// 无条件写入
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `value` - 缓存值
    /// * `exp` - 过期策略
    async fn set(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()>;

    /// 以默认过期策略写入
    async fn set_default(&self, key: &str, value: CacheValue) -> Result<()> {
        self.set(key, value, Expiration::Default).await
    }

    /// 仅当键不存在时写入，否则返回 `AlreadyExists`
    async fn add(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()>;

    /// 仅当键存在时写入，否则返回 `NotFound`
    async fn replace(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()>;

    /// 获取缓存值
    ///
    /// # 返回值
    ///
    /// 返回缓存值，如果不存在或已过期则返回None
    async fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// 获取缓存值及其绝对过期时间（`None` 表示永不过期）
    async fn get_with_expiration(
        &self,
        key: &str,
    ) -> Result<Option<(CacheValue, Option<DateTime<Utc>>)>>;

    /// 数值自增
    async fn increment(&self, key: &str, n: i64) -> Result<()>;

    /// 数值自减
    async fn decrement(&self, key: &str, n: i64) -> Result<()>;

    /// 删除缓存项，键不存在时不报错
    async fn delete(&self, key: &str) -> Result<()>;

    /// 立即清理过期条目
    async fn delete_expired(&self) -> Result<()>;

    /// 所有未过期条目的快照
    async fn items(&self) -> Result<HashMap<String, CacheItem>>;

    /// 条目数量
    async fn item_count(&self) -> Result<usize>;

    /// 清空缓存
    async fn flush(&self) -> Result<()>;

    /// 优雅关闭客户端
    ///
    /// 关闭自己创建的后台任务，释放资源
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// 缓存扩展特征
///
/// 提供类型安全的缓存操作接口
#[async_trait]
pub trait CacheExt: CacheOps {
    /// 获取缓存值并按 `T` 解释
    ///
    /// 适用于经同步总线传来、只剩无类型 JSON 的结构化值
    #[instrument(skip(self), level = "debug")]
    async fn get_as<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => {
                let json = match value {
                    CacheValue::Json(json) => json,
                    other => other.to_json(),
                };
                serde_json::from_value(json)
                    .map(Some)
                    .map_err(|e| CacheError::Serialization(e.to_string()))
            }
            None => Ok(None),
        }
    }

    /// 将 `value` 以结构化值写入
    #[instrument(skip(self, value), level = "debug")]
    async fn set_as<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        exp: Expiration,
    ) -> Result<()> {
        let json = serde_json::to_value(value)?;
        self.set(key, CacheValue::Json(json), exp).await
    }
}

impl<T: CacheOps + ?Sized> CacheExt for T {}

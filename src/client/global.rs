//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的全局缓存客户端。

use super::CacheOps;
use crate::backend::{RedisBackend, SetMode};
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::ValueCodec;
use crate::value::{CacheItem, CacheValue, Expiration};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{instrument, warn};

/// 全局缓存客户端
///
/// 多个进程共享的权威缓存层；过期由服务端负责
///
/// 与本地缓存的差异：
///
/// - 整数以十进制文本存放，读回时宽度为 `i64`（超出时为 `u64`）
/// - 浮点数以带标签的 JSON 存放，`increment`/`decrement` 对其返回 `TypeMismatch`；
///   服务端只对整数文本做原子自增
pub struct RedisCache {
    name: String,
    backend: RedisBackend,
    codec: ValueCodec,
    /// 默认过期时间，`None` 表示默认永不过期
    default_ttl: Option<Duration>,
}

impl RedisCache {
    /// 创建全局缓存客户端
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称
    /// * `backend` - 已连接的Redis后端
    /// * `codec` - 值编解码器
    /// * `default_ttl` - 默认过期时间
    pub fn new(
        name: impl Into<String>,
        backend: RedisBackend,
        codec: ValueCodec,
        default_ttl: Option<Duration>,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            codec,
            default_ttl: default_ttl.filter(|d| !d.is_zero()),
        }
    }

    /// 按配置连接并创建客户端
    ///
    /// `fallback_ttl` 在配置未指定 `default_ttl_secs` 时使用
    pub async fn connect(
        name: impl Into<String>,
        config: &RedisConfig,
        fallback_ttl: Option<Duration>,
    ) -> Result<Self> {
        let backend = RedisBackend::connect(config).await?;
        let default_ttl = match config.default_ttl_secs {
            Some(secs) => Some(Duration::from_secs(secs)),
            None => fallback_ttl,
        };
        Ok(Self::new(
            name,
            backend,
            ValueCodec::new(config.compress),
            default_ttl,
        ))
    }

    pub fn backend(&self) -> &RedisBackend {
        &self.backend
    }

    async fn write(
        &self,
        key: &str,
        value: &CacheValue,
        exp: Expiration,
        mode: SetMode,
    ) -> Result<bool> {
        let bytes = self.codec.encode(value)?;
        self.backend
            .set(key, bytes, exp.resolve(self.default_ttl), mode)
            .await
    }

    fn decode_entry(&self, key: &str, bytes: &[u8], pttl: i64) -> Option<CacheItem> {
        match self.codec.decode(bytes) {
            Ok(value) => Some(CacheItem::new(value, deadline_from_pttl(pttl))),
            Err(e) => {
                warn!("RedisCache: {} 无法解码键 {}: {}", self.name, key, e);
                None
            }
        }
    }
}

/// 将 PTTL 应答换算为绝对过期时间：-1 表示无过期时间
fn deadline_from_pttl(pttl: i64) -> Option<DateTime<Utc>> {
    if pttl > 0 {
        Some(Utc::now() + chrono::Duration::milliseconds(pttl))
    } else {
        None
    }
}

#[async_trait]
impl CacheOps for RedisCache {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn set(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        self.write(key, &value, exp, SetMode::Always).await?;
        Ok(())
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn add(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        if self.write(key, &value, exp, SetMode::IfAbsent).await? {
            Ok(())
        } else {
            Err(CacheError::AlreadyExists(key.to_string()))
        }
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn replace(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        if self.write(key, &value, exp, SetMode::IfPresent).await? {
            Ok(())
        } else {
            Err(CacheError::NotFound(key.to_string()))
        }
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let value = match self.backend.get(key).await? {
            Some(bytes) => Some(self.codec.decode(&bytes)?),
            None => None,
        };
        let result = if value.is_some() { "hit" } else { "miss" };
        GLOBAL_METRICS.record_request(&self.name, "global", "get", result);
        Ok(value)
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn get_with_expiration(
        &self,
        key: &str,
    ) -> Result<Option<(CacheValue, Option<DateTime<Utc>>)>> {
        let entry = match self.backend.get_with_pttl(key).await? {
            Some((bytes, pttl)) => Some((self.codec.decode(&bytes)?, deadline_from_pttl(pttl))),
            None => None,
        };
        let result = if entry.is_some() { "hit" } else { "miss" };
        GLOBAL_METRICS.record_request(&self.name, "global", "get", result);
        Ok(entry)
    }

    /// 仅作用于整数；浮点数返回 `TypeMismatch`
    async fn increment(&self, key: &str, n: i64) -> Result<()> {
        self.backend.incr_by(key, n, false).await.map(|_| ())
    }

    async fn decrement(&self, key: &str, n: i64) -> Result<()> {
        self.backend.incr_by(key, n, true).await.map(|_| ())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.backend.del(key).await
    }

    /// 服务端自行淘汰过期键
    async fn delete_expired(&self) -> Result<()> {
        Ok(())
    }

    async fn items(&self) -> Result<HashMap<String, CacheItem>> {
        let entries = self.backend.entries().await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, (bytes, pttl))| {
                self.decode_entry(&key, &bytes, pttl).map(|item| (key, item))
            })
            .collect())
    }

    async fn item_count(&self) -> Result<usize> {
        self.backend.count().await
    }

    async fn flush(&self) -> Result<()> {
        self.backend.flush().await
    }
}

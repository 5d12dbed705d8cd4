//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存管理器，按配置创建并管理各个命名服务。

use crate::client::{CacheOps, LocalCache, RedisCache, TieredCache};
use crate::config::{Config, ServiceConfig};
use crate::error::{CacheError, Result};
use crate::pool::CachePool;
use crate::sync::{RedisStreamTransport, SyncPublisher, SyncTransport};
use crate::value::{CacheValue, Expiration};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// 单个命名服务
///
/// 本地缓存总是存在；配置了全局层时通过 `ops()` 得到分层缓存
pub struct CacheService {
    name: String,
    pool: CachePool,
    tiered: Option<TieredCache>,
    publisher: Option<SyncPublisher>,
}

impl CacheService {
    pub fn new(name: impl Into<String>, pool: CachePool) -> Self {
        Self {
            name: name.into(),
            pool,
            tiered: None,
            publisher: None,
        }
    }

    pub fn with_tiered(mut self, tiered: TieredCache) -> Self {
        self.tiered = Some(tiered);
        self
    }

    pub fn with_publisher(mut self, publisher: SyncPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// 按服务配置构建
    #[instrument(skip(config), level = "info")]
    pub async fn from_config(name: &str, config: &Config) -> Result<Self> {
        let service_cfg = config.services.get(name).ok_or_else(|| {
            CacheError::Configuration(format!("service {} is not configured", name))
        })?;
        build_service(name, service_cfg, config).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &CachePool {
        &self.pool
    }

    pub fn local(&self) -> &Arc<LocalCache> {
        self.pool.cache()
    }

    pub fn tiered(&self) -> Option<&TieredCache> {
        self.tiered.as_ref()
    }

    /// 应用代码使用的缓存：有全局层时为分层缓存，否则为本地缓存
    pub fn ops(&self) -> &dyn CacheOps {
        match &self.tiered {
            Some(tiered) => tiered,
            None => self.pool.cache().as_ref(),
        }
    }

    /// 向同步总线广播一次写入
    pub async fn publish(&self, key: &str, value: &CacheValue, exp: Expiration) -> Result<()> {
        match &self.publisher {
            Some(publisher) => publisher.publish(key, value, exp).await,
            None => Err(CacheError::Configuration(format!(
                "service {} has no sync bus",
                self.name
            ))),
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(tiered) = &self.tiered {
            tiered.shutdown().await?;
        }
        self.pool.close().await;
        info!("CacheService: {} 已关闭", self.name);
        Ok(())
    }
}

async fn build_service(name: &str, cfg: &ServiceConfig, config: &Config) -> Result<CacheService> {
    let settings = cfg.local_settings(&config.global);
    let local = LocalCache::builder()
        .name(name)
        .default_expiration(settings.default_expiration)
        .cleanup_interval(settings.cleanup_interval)
        .sticky_interval(settings.sticky_interval)
        .build()?;
    let pool = CachePool::new(Arc::new(local));
    let mut service = CacheService::new(name, pool);

    if let Some(redis_cfg) = &cfg.redis {
        let global = RedisCache::connect(
            format!("{}-global", name),
            redis_cfg,
            settings.default_expiration,
        )
        .await?;
        let tiered = TieredCache::builder()
            .name(name)
            .local(service.pool.cache().clone())
            .global(Arc::new(global))
            .build()?;
        service = service.with_tiered(tiered);
    }

    if let Some(sync_cfg) = &cfg.sync {
        let transport: Arc<dyn SyncTransport> =
            Arc::new(RedisStreamTransport::from_config(sync_cfg, cfg.redis.as_ref()).await?);
        if sync_cfg.consume {
            service
                .pool
                .use_sync(transport.clone(), &sync_cfg.queue)
                .await?;
        }
        service = service.with_publisher(SyncPublisher::new(transport));
    }

    Ok(service)
}

/// 缓存管理器
///
/// 由应用显式创建并传递，库内不存在进程级的默认实例
#[derive(Default)]
pub struct CacheManager {
    services: DashMap<String, Arc<CacheService>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据配置初始化所有服务
    ///
    /// # 参数
    ///
    /// * `config` - 缓存系统配置
    #[instrument(skip(config), level = "info", fields(service_count = config.services.len()))]
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate().map_err(CacheError::Configuration)?;
        info!(
            "Initializing CacheManager with {} services",
            config.services.len()
        );

        let manager = Self::new();
        for (name, service_cfg) in &config.services {
            match build_service(name, service_cfg, config).await {
                Ok(service) => {
                    manager.register(service);
                }
                Err(e) => {
                    manager.shutdown().await;
                    return Err(e);
                }
            }
        }
        Ok(manager)
    }

    /// 注册服务，同名服务被替换时返回旧服务（旧服务需由调用方关闭）
    pub fn register(&self, service: CacheService) -> Option<Arc<CacheService>> {
        self.services
            .insert(service.name().to_string(), Arc::new(service))
    }

    pub fn service(&self, name: &str) -> Option<Arc<CacheService>> {
        self.services.get(name).map(|s| s.value().clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|s| s.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// 关闭并移除所有服务
    pub async fn shutdown(&self) {
        let services: Vec<Arc<CacheService>> =
            self.services.iter().map(|s| s.value().clone()).collect();
        self.services.clear();
        let results = futures::future::join_all(services.iter().map(|s| s.shutdown())).await;
        for (service, result) in services.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!("CacheManager: 关闭服务 {} 失败: {}", service.name(), e);
            }
        }
    }
}

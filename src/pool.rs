//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存池：一个本地缓存加上可随时启停的同步消费者。

use crate::client::LocalCache;
use crate::error::Result;
use crate::sync::{SyncConsumer, SyncTransport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 缓存池
///
/// 每次调用 `use_sync` 都会启动一个新的独立消费者，避免重复启动是调用方的责任
pub struct CachePool {
    cache: Arc<LocalCache>,
    consumers: Mutex<Vec<SyncConsumer>>,
}

impl CachePool {
    pub fn new(cache: Arc<LocalCache>) -> Self {
        Self {
            cache,
            consumers: Mutex::new(Vec::new()),
        }
    }

    /// 默认参数的缓存池：默认过期5分钟，清理周期30分钟，常驻镜像重建周期10分钟
    pub fn with_defaults() -> Result<Self> {
        let cache = LocalCache::new(
            Some(Duration::from_secs(5 * 60)),
            Duration::from_secs(30 * 60),
            Duration::from_secs(10 * 60),
        )?;
        Ok(Self::new(Arc::new(cache)))
    }

    pub fn cache(&self) -> &Arc<LocalCache> {
        &self.cache
    }

    /// 启动一个同步消费者，把广播中的写入应用到本地缓存
    ///
    /// # 参数
    ///
    /// * `transport` - 广播传输
    /// * `queue` - 本实例的队列名
    pub async fn use_sync(&self, transport: Arc<dyn SyncTransport>, queue: &str) -> Result<()> {
        let consumer = SyncConsumer::start(self.cache.clone(), transport, queue).await?;
        self.consumers.lock().push(consumer);
        Ok(())
    }

    /// 运行中的同步消费者数量
    pub fn sync_count(&self) -> usize {
        self.consumers
            .lock()
            .iter()
            .filter(|c| !c.is_finished())
            .count()
    }

    /// 停止全部同步消费者并等待其退出
    pub async fn stop_sync(&self) {
        let consumers: Vec<SyncConsumer> = std::mem::take(&mut *self.consumers.lock());
        for consumer in &consumers {
            consumer.shutdown().await;
        }
        if !consumers.is_empty() {
            info!("CachePool: 已停止 {} 个同步消费者", consumers.len());
        }
    }

    /// 停止同步消费者和本地缓存的后台任务
    pub async fn close(&self) {
        self.stop_sync().await;
        self.cache.shutdown().await;
    }
}

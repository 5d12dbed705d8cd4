//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了过期清理任务，按固定周期清除内存存储中的过期条目。

use super::memory::MemoryStore;
use crate::error::{CacheError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 过期清理任务句柄
///
/// 必须显式调用 `stop`/`shutdown`；句柄被丢弃时也会取消任务
pub struct Janitor {
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Janitor {
    /// 启动清理任务
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称，用于日志
    /// * `store` - 被清理的存储
    /// * `interval` - 清理周期，必须大于零
    pub fn start(name: &str, store: Arc<MemoryStore>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(CacheError::Configuration(
                "janitor interval must be positive".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            CacheError::Configuration(format!(
                "cache {} needs a tokio runtime to run its janitor",
                name
            ))
        })?;

        let token = CancellationToken::new();
        let child = token.clone();
        let name = name.to_string();
        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("Janitor: 启动，cache={}, interval={:?}", name, interval);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.delete_expired();
                        if removed > 0 {
                            debug!("Janitor: cache={} 清理 {} 个过期条目", name, removed);
                        }
                    }
                }
            }
            info!("Janitor: cache={} 已停止", name);
        });

        Ok(Self {
            token,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// 通知任务停止，不等待其退出
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// 停止任务并等待其退出
    pub async fn shutdown(&self) {
        self.token.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

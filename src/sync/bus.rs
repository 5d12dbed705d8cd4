//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步总线的发布者和消费者。

use super::message::SyncMessage;
use super::transport::SyncTransport;
use crate::client::LocalCache;
use crate::error::Result;
use crate::metrics::GLOBAL_METRICS;
use crate::value::{CacheValue, Expiration};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// 传输错误后的退避时间
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// 同步发布者
#[derive(Clone)]
pub struct SyncPublisher {
    transport: Arc<dyn SyncTransport>,
}

impl SyncPublisher {
    pub fn new(transport: Arc<dyn SyncTransport>) -> Self {
        Self { transport }
    }

    /// 广播一次写入
    ///
    /// 只保证消息交给了传输层，不感知任何订阅者是否收到
    #[instrument(skip(self, value), level = "debug")]
    pub async fn publish(&self, key: &str, value: &CacheValue, exp: Expiration) -> Result<()> {
        let payload = SyncMessage::new(key, value, exp).encode()?;
        self.transport.publish(&payload).await?;
        GLOBAL_METRICS.record_sync("publisher", "published");
        debug!("SyncPublisher: 已发布 key={}", key);
        Ok(())
    }
}

/// 同步消费者
///
/// 后台任务把收到的每条消息以 `set` 写入本地缓存；解码失败的消息被记录并跳过，
/// 传输错误退避后重试读取。取消或通道关闭时退出
pub struct SyncConsumer {
    queue: String,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncConsumer {
    /// 绑定队列并启动消费任务
    ///
    /// # 参数
    ///
    /// * `cache` - 接收写入的本地缓存
    /// * `transport` - 广播传输
    /// * `queue` - 本实例的队列名，各实例必须互不相同
    pub async fn start(
        cache: Arc<LocalCache>,
        transport: Arc<dyn SyncTransport>,
        queue: &str,
    ) -> Result<Self> {
        let mut subscription = transport.bind(queue).await?;
        let token = CancellationToken::new();
        let child = token.clone();
        let name = queue.to_string();

        let handle = tokio::spawn(async move {
            info!("SyncConsumer: 启动，queue={}", name);
            loop {
                let next = tokio::select! {
                    _ = child.cancelled() => break,
                    next = subscription.next() => next,
                };
                match next {
                    Some(Ok(delivery)) => match SyncMessage::decode(&delivery.payload) {
                        Ok(message) => {
                            let (key, value, exp) = message.into_parts();
                            debug!("SyncConsumer: queue={} 应用 key={}", name, key);
                            cache.set(&key, value, exp);
                            GLOBAL_METRICS.record_sync(&name, "applied");
                        }
                        Err(e) => {
                            warn!(
                                "SyncConsumer: queue={} 跳过无法解码的消息 {}: {}",
                                name, delivery.message_id, e
                            );
                            GLOBAL_METRICS.record_sync(&name, "decode_error");
                        }
                    },
                    Some(Err(e)) => {
                        warn!("SyncConsumer: queue={} 读取失败: {}", name, e);
                        GLOBAL_METRICS.record_sync(&name, "transport_error");
                        tokio::select! {
                            _ = child.cancelled() => break,
                            _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                        }
                    }
                    None => {
                        info!("SyncConsumer: queue={} 通道已关闭", name);
                        break;
                    }
                }
            }
            info!("SyncConsumer: queue={} 已停止", name);
        });

        Ok(Self {
            queue: queue.to_string(),
            token,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
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

    /// 任务是否已退出（被取消或通道关闭）
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }
}

impl Drop for SyncConsumer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步总线的传输接口，以及进程内的广播实现。

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// 广播通道的保留名称
pub const EXCHANGE_NAME: &str = "exchange.__cache_sync__";

/// 一条投递
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: Vec<u8>,
    pub message_id: String,
}

impl Delivery {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            message_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// 广播传输
///
/// 每个绑定的队列都会收到每条已发布消息的一份副本；不保证送达，也不保证跨发布者的顺序
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// 发布消息，不等待任何订阅者确认
    async fn publish(&self, payload: &str) -> Result<()>;

    /// 声明（或复用）名为 `queue` 的持久队列并绑定到广播通道
    async fn bind(&self, queue: &str) -> Result<Box<dyn SyncSubscription>>;
}

/// 队列订阅
#[async_trait]
pub trait SyncSubscription: Send {
    /// 等待下一条投递；通道关闭时返回 `None`
    async fn next(&mut self) -> Option<Result<Delivery>>;
}

struct MemoryQueue {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>,
}

/// 进程内广播
///
/// 队列在首次绑定时创建，之后发布的消息即使暂时没有订阅者也会保留在队列中；
/// 同一队列的多个订阅互相竞争消费
#[derive(Clone, Default)]
pub struct MemoryBroker {
    queues: Arc<DashMap<String, MemoryQueue>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// 删除队列，其订阅在读完剩余消息后结束
    pub fn delete_queue(&self, queue: &str) -> bool {
        self.queues.remove(queue).is_some()
    }

    /// 删除全部队列
    pub fn close(&self) {
        self.queues.clear();
    }
}

#[async_trait]
impl SyncTransport for MemoryBroker {
    async fn publish(&self, payload: &str) -> Result<()> {
        let delivery = Delivery::new(payload);
        for queue in self.queues.iter() {
            if queue.tx.send(delivery.clone()).is_err() {
                debug!("MemoryBroker: 队列 {} 已关闭", queue.key());
            }
        }
        Ok(())
    }

    async fn bind(&self, queue: &str) -> Result<Box<dyn SyncSubscription>> {
        if queue.is_empty() {
            return Err(CacheError::Configuration(
                "queue name cannot be empty".to_string(),
            ));
        }
        let rx = self
            .queues
            .entry(queue.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                MemoryQueue {
                    tx,
                    rx: Arc::new(Mutex::new(rx)),
                }
            })
            .rx
            .clone();
        Ok(Box::new(MemorySubscription { rx }))
    }
}

struct MemorySubscription {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>,
}

#[async_trait]
impl SyncSubscription for MemorySubscription {
    async fn next(&mut self) -> Option<Result<Delivery>> {
        self.rx.lock().await.recv().await.map(Ok)
    }
}

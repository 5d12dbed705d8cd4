//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis Stream的同步总线传输：广播通道是一个流，
//! 每个实例的队列是该流上的一个消费组。

use super::message::CONTENT_TYPE;
use super::transport::{Delivery, SyncSubscription, SyncTransport, EXCHANGE_NAME};
use crate::config::{resolve_url, RedisConfig, SyncConfig};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::StreamReadReply;
use redis::Client;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

/// 单次读取的最大消息数
const READ_COUNT: usize = 16;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn transport_error(e: redis::RedisError) -> CacheError {
    CacheError::Transport(e.to_string())
}

/// Redis Stream 传输
#[derive(Clone)]
pub struct RedisStreamTransport {
    client: Client,
    manager: ConnectionManager,
    stream: String,
    max_len: usize,
    block_ms: u64,
}

impl RedisStreamTransport {
    /// 连接到 `url` 指定的 Redis
    ///
    /// # 参数
    ///
    /// * `url` - 连接地址
    /// * `max_len` - 流的近似最大长度
    /// * `block_ms` - 单次阻塞读取的最长等待
    #[instrument(skip(url), level = "info", name = "init_sync_transport")]
    pub async fn connect(url: &str, max_len: usize, block_ms: u64) -> Result<Self> {
        let client = Client::open(url).map_err(transport_error)?;
        let manager = match timeout(CONNECT_TIMEOUT, client.get_connection_manager()).await {
            Ok(res) => res.map_err(transport_error)?,
            Err(_) => {
                return Err(CacheError::Timeout(format!(
                    "Connection timed out after {:?}",
                    CONNECT_TIMEOUT
                )))
            }
        };
        info!("RedisStreamTransport: 已连接，stream={}", EXCHANGE_NAME);
        Ok(Self {
            client,
            manager,
            stream: EXCHANGE_NAME.to_string(),
            max_len,
            block_ms,
        })
    }

    /// 按同步配置连接；未单独配置连接地址时复用全局层的 Redis
    pub async fn from_config(sync: &SyncConfig, redis: Option<&RedisConfig>) -> Result<Self> {
        let url = match (&sync.connection_string, redis) {
            (Some(secret), _) => resolve_url(secret, sync.enable_tls),
            (None, Some(redis)) => redis.connection_url(),
            (None, None) => {
                return Err(CacheError::Configuration(
                    "sync transport needs a redis connection string".to_string(),
                ))
            }
        };
        Self::connect(&url, sync.stream_max_len, sync.block_ms).await
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }
}

#[async_trait]
impl SyncTransport for RedisStreamTransport {
    async fn publish(&self, payload: &str) -> Result<()> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let mut conn = self.manager.clone();
        let id: String = redis::cmd("XADD")
            .arg(&self.stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*")
            .arg("payload")
            .arg(payload)
            .arg("message_id")
            .arg(&message_id)
            .arg("content_type")
            .arg(CONTENT_TYPE)
            .query_async(&mut conn)
            .await
            .map_err(transport_error)?;
        debug!("RedisStreamTransport: 发布消息 {} ({})", message_id, id);
        Ok(())
    }

    async fn bind(&self, queue: &str) -> Result<Box<dyn SyncSubscription>> {
        if queue.is_empty() {
            return Err(CacheError::Configuration(
                "queue name cannot be empty".to_string(),
            ));
        }
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(transport_error)?;

        let created: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(queue)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => debug!("RedisStreamTransport: 创建消费组 {}", queue),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!("RedisStreamTransport: 复用消费组 {}", queue)
            }
            Err(e) => return Err(transport_error(e)),
        }

        Ok(Box::new(StreamSubscription {
            conn,
            stream: self.stream.clone(),
            group: queue.to_string(),
            consumer: format!("{}-consumer", queue),
            block_ms: self.block_ms,
            buffer: VecDeque::new(),
        }))
    }
}

struct StreamSubscription {
    conn: MultiplexedConnection,
    stream: String,
    group: String,
    consumer: String,
    block_ms: u64,
    buffer: VecDeque<Delivery>,
}

impl StreamSubscription {
    /// 读取一批新消息并立即确认
    async fn fill(&mut self) -> Result<()> {
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(READ_COUNT)
            .arg("BLOCK")
            .arg(self.block_ms)
            .arg("STREAMS")
            .arg(&self.stream)
            .arg(">")
            .query_async(&mut self.conn)
            .await
            .map_err(transport_error)?;

        let Some(reply) = reply else {
            return Ok(());
        };

        let mut ids = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let payload: Vec<u8> = entry.get("payload").unwrap_or_default();
                let message_id: String = entry.get("message_id").unwrap_or_default();
                ids.push(entry.id);
                self.buffer.push_back(Delivery {
                    payload,
                    message_id,
                });
            }
        }

        if !ids.is_empty() {
            let _: i64 = redis::cmd("XACK")
                .arg(&self.stream)
                .arg(&self.group)
                .arg(&ids)
                .query_async(&mut self.conn)
                .await
                .map_err(transport_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl SyncSubscription for StreamSubscription {
    async fn next(&mut self) -> Option<Result<Delivery>> {
        loop {
            if let Some(delivery) = self.buffer.pop_front() {
                return Some(Ok(delivery));
            }
            if let Err(e) = self.fill().await {
                return Some(Err(e));
            }
        }
    }
}

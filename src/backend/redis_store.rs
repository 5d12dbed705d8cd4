//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了Redis远端存储后端，为全局缓存层提供带命名空间的键值操作。

use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use redis::{aio::ConnectionManager, Client, RedisResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// SCAN/DEL 的批大小
const BATCH_SIZE: usize = 200;

/// 对不存在的键拒绝自增，避免 INCRBY 隐式创建键
const INCR_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
return redis.call(ARGV[1], KEYS[1], ARGV[2])
"#;

/// 条件写入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// 无条件写入
    Always,
    /// 仅当键不存在时写入（NX）
    IfAbsent,
    /// 仅当键存在时写入（XX）
    IfPresent,
}

/// 远端条目：值字节与 PTTL（毫秒，-1 表示无过期时间）
pub type RemoteEntry = (Vec<u8>, i64);

/// Redis后端
///
/// 所有命令都受 `command_timeout` 约束，超时返回 `Timeout`，不做重试
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
    namespace: String,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("namespace", &self.namespace)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RedisBackend {
    /// 建立连接
    ///
    /// # 参数
    ///
    /// * `config` - Redis配置
    ///
    /// # 返回值
    ///
    /// 返回新的RedisBackend实例或错误
    #[instrument(skip(config), level = "info", name = "init_redis_backend", fields(namespace = %config.namespace))]
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let connection_string = config.connection_url();
        let client = Client::open(connection_string.as_str())?;
        let manager = match timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => {
                return Err(CacheError::Timeout(format!(
                    "Connection timed out after {}ms",
                    config.connection_timeout_ms
                )));
            }
        };
        debug!("RedisBackend: 已连接，namespace={}", config.namespace);
        Ok(Self {
            manager,
            namespace: config.namespace.clone(),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn strip_namespace<'a>(&self, full: &'a str) -> Option<&'a str> {
        full.strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
    }

    async fn timed<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match timeout(self.command_timeout, fut).await {
            Ok(res) => res.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout(format!(
                "redis {} timed out after {:?}",
                op, self.command_timeout
            ))),
        }
    }

    /// 写入值
    ///
    /// # 返回值
    ///
    /// 条件写入未满足时返回 `false`
    #[instrument(skip(self, value), level = "debug")]
    pub async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        mode: SetMode,
    ) -> Result<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.full_key(key)).arg(value);
        if let Some(ttl) = ttl {
            let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            cmd.arg("PX").arg(ms);
        }
        match mode {
            SetMode::Always => {}
            SetMode::IfAbsent => {
                cmd.arg("NX");
            }
            SetMode::IfPresent => {
                cmd.arg("XX");
            }
        }
        let mut conn = self.manager.clone();
        let reply: Option<String> = self.timed("SET", cmd.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let cmd = redis::cmd("GET").arg(self.full_key(key)).clone();
        self.timed("GET", cmd.query_async(&mut conn)).await
    }

    /// 读取值及其剩余存活时间
    #[instrument(skip(self), level = "debug")]
    pub async fn get_with_pttl(&self, key: &str) -> Result<Option<RemoteEntry>> {
        let full = self.full_key(key);
        let mut conn = self.manager.clone();
        let pipe = redis::pipe()
            .cmd("GET")
            .arg(&full)
            .cmd("PTTL")
            .arg(&full)
            .clone();
        let (value, pttl): (Option<Vec<u8>>, i64) =
            self.timed("GET/PTTL", pipe.query_async(&mut conn)).await?;
        Ok(value.map(|v| (v, pttl)))
    }

    /// 对已存在的整数键做加减，返回新值
    ///
    /// 键不存在时返回 `NotFound`，值不是整数时返回 `TypeMismatch`
    #[instrument(skip(self), level = "debug")]
    pub async fn incr_by(&self, key: &str, n: i64, subtract: bool) -> Result<i64> {
        let command = if subtract { "DECRBY" } else { "INCRBY" };
        let script = redis::Script::new(INCR_SCRIPT);
        let mut invocation = script.key(self.full_key(key));
        invocation.arg(command).arg(n);
        let mut conn = self.manager.clone();
        let result: Result<Option<i64>> = self
            .timed(command, invocation.invoke_async(&mut conn))
            .await;
        match result {
            Ok(Some(v)) => Ok(v),
            Ok(None) => Err(CacheError::NotFound(key.to_string())),
            Err(CacheError::Redis(e)) if e.to_string().contains("not an integer") => Err(
                CacheError::TypeMismatch(format!("the value for {} is not an integer", key)),
            ),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let cmd = redis::cmd("DEL").arg(self.full_key(key)).clone();
        let _: i64 = self.timed("DEL", cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    /// 列出命名空间下的全部完整键名
    pub async fn scan_keys(&self) -> Result<Vec<String>> {
        let pattern = format!("{}:*", self.namespace);
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let cmd = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(BATCH_SIZE)
                .clone();
            let (next, batch): (u64, Vec<String>) =
                self.timed("SCAN", cmd.query_async(&mut conn)).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// 读取命名空间下全部条目，键名已去掉命名空间前缀
    ///
    /// 扫描与读取之间消失的键会被跳过
    pub async fn entries(&self) -> Result<Vec<(String, RemoteEntry)>> {
        let keys = self.scan_keys().await?;
        let mut conn = self.manager.clone();
        let mut entries = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(BATCH_SIZE) {
            let mut pipe = redis::pipe();
            pipe.cmd("MGET").arg(chunk);
            for key in chunk {
                pipe.cmd("PTTL").arg(key);
            }
            let raw: Vec<redis::Value> =
                self.timed("MGET/PTTL", pipe.query_async(&mut conn)).await?;
            let (values, ttls) = split_entries_reply(raw)?;
            for ((full, value), pttl) in chunk.iter().zip(values).zip(ttls) {
                if let (Some(value), Some(key)) = (value, self.strip_namespace(full)) {
                    if pttl != -2 {
                        entries.push((key.to_string(), (value, pttl)));
                    }
                }
            }
        }
        Ok(entries)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.scan_keys().await?.len())
    }

    /// 删除命名空间下的全部键
    #[instrument(skip(self), level = "info")]
    pub async fn flush(&self) -> Result<()> {
        let keys = self.scan_keys().await?;
        let mut conn = self.manager.clone();
        for chunk in keys.chunks(BATCH_SIZE) {
            let cmd = redis::cmd("DEL").arg(chunk).clone();
            let _: i64 = self.timed("DEL", cmd.query_async(&mut conn)).await?;
        }
        debug!(
            "RedisBackend: 清空命名空间 {}，删除 {} 个键",
            self.namespace,
            keys.len()
        );
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let cmd = redis::cmd("PING");
        let _: String = self.timed("PING", cmd.query_async(&mut conn)).await?;
        Ok(())
    }
}

/// 拆分 `MGET + N×PTTL` 流水线的应答
fn split_entries_reply(raw: Vec<redis::Value>) -> Result<(Vec<Option<Vec<u8>>>, Vec<i64>)> {
    let mut iter = raw.into_iter();
    let values = match iter.next() {
        Some(v) => redis::from_redis_value(&v)?,
        None => Vec::new(),
    };
    let ttls = iter
        .map(|v| redis::from_redis_value::<i64>(&v))
        .collect::<RedisResult<Vec<i64>>>()?;
    Ok((values, ttls))
}

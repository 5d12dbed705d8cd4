//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步总线的消息格式。

use crate::error::Result;
use crate::value::{CacheValue, Expiration};
use serde::{Deserialize, Serialize};

/// 同步消息的内容类型
pub const CONTENT_TYPE: &str = "application/json";

/// 同步消息
///
/// 线上格式为 JSON：`{"key": string, "value": any, "ttl": 纳秒}`。
/// `value` 是无类型 JSON，接收方得到的结构化值不带原始具体类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub key: String,
    pub value: serde_json::Value,
    /// 有符号纳秒：0 为默认过期，负数为永不过期
    pub ttl: i64,
}

impl SyncMessage {
    pub fn new(key: impl Into<String>, value: &CacheValue, exp: Expiration) -> Self {
        Self {
            key: key.into(),
            value: value.to_json(),
            ttl: exp.as_nanos(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// 还原为可直接写入本地存储的 `(key, value, expiration)`
    pub fn into_parts(self) -> (String, CacheValue, Expiration) {
        (
            self.key,
            CacheValue::from_json(self.value),
            Expiration::from_nanos(self.ttl),
        )
    }
}

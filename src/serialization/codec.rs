//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存值在远端存储中的编码方式。

use super::{JsonSerializer, Serializer};
use crate::error::Result;
use crate::value::{CacheValue, Number};

/// 缓存值编解码器
///
/// 整数以十进制文本存放，使服务端 INCRBY/DECRBY 可以直接作用；
/// 其余值以带类型标签的 JSON 存放。整数宽度不保留，读回时为 `i64`（超出时为 `u64`）
#[derive(Clone, Debug, Default)]
pub struct ValueCodec {
    json: JsonSerializer,
}

impl ValueCodec {
    pub fn new(compress: bool) -> Self {
        let json = if compress {
            JsonSerializer::with_compression()
        } else {
            JsonSerializer::new()
        };
        Self { json }
    }

    pub fn encode(&self, value: &CacheValue) -> Result<Vec<u8>> {
        match value {
            CacheValue::Number(n) if !n.is_float() => Ok(n.to_string().into_bytes()),
            other => self.json.serialize(other),
        }
    }

    pub fn decode(&self, data: &[u8]) -> Result<CacheValue> {
        if let Some(n) = parse_integer(data) {
            return Ok(CacheValue::Number(n));
        }
        self.json.deserialize(data)
    }
}

fn parse_integer(data: &[u8]) -> Option<Number> {
    let text = std::str::from_utf8(data).ok()?;
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::I64(i));
    }
    text.parse::<u64>().ok().map(Number::U64)
}

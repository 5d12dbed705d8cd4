//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存值模型：带宽度的数值、文本、字节、结构化值，以及过期策略。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 带宽度的数值
///
/// 自增/自减始终在数值自身的宽度内进行，不会跨调用隐式扩宽
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "n", rename_all = "lowercase")]
pub enum Number {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

macro_rules! offset_int {
    ($v:expr, $t:ty, $n:expr, $sub:expr) => {
        if $sub {
            $v.wrapping_sub($n as $t)
        } else {
            $v.wrapping_add($n as $t)
        }
    };
}

impl Number {
    /// 数值宽度名称，例如 `i32`
    pub fn kind(&self) -> &'static str {
        match self {
            Number::I8(_) => "i8",
            Number::I16(_) => "i16",
            Number::I32(_) => "i32",
            Number::I64(_) => "i64",
            Number::U8(_) => "u8",
            Number::U16(_) => "u16",
            Number::U32(_) => "u32",
            Number::U64(_) => "u64",
            Number::F32(_) => "f32",
            Number::F64(_) => "f64",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Number::F32(_) | Number::F64(_))
    }

    /// 以 `i64` 偏移量调整数值
    ///
    /// 偏移量先按补码截断到目标宽度，再做回绕加减
    pub(crate) fn offset(self, n: i64, subtract: bool) -> Number {
        match self {
            Number::I8(v) => Number::I8(offset_int!(v, i8, n, subtract)),
            Number::I16(v) => Number::I16(offset_int!(v, i16, n, subtract)),
            Number::I32(v) => Number::I32(offset_int!(v, i32, n, subtract)),
            Number::I64(v) => Number::I64(offset_int!(v, i64, n, subtract)),
            Number::U8(v) => Number::U8(offset_int!(v, u8, n, subtract)),
            Number::U16(v) => Number::U16(offset_int!(v, u16, n, subtract)),
            Number::U32(v) => Number::U32(offset_int!(v, u32, n, subtract)),
            Number::U64(v) => Number::U64(offset_int!(v, u64, n, subtract)),
            Number::F32(v) => Number::F32(if subtract { v - n as f32 } else { v + n as f32 }),
            Number::F64(v) => Number::F64(if subtract { v - n as f64 } else { v + n as f64 }),
        }
    }

    /// 浮点偏移，仅对 `f32`/`f64` 有效
    pub(crate) fn offset_float(self, n: f64, subtract: bool) -> Option<Number> {
        match self {
            Number::F32(v) => Some(Number::F32(if subtract {
                v - n as f32
            } else {
                v + n as f32
            })),
            Number::F64(v) => Some(Number::F64(if subtract { v - n } else { v + n })),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match *self {
            Number::I8(v) => v.into(),
            Number::I16(v) => v.into(),
            Number::I32(v) => v.into(),
            Number::I64(v) => v.into(),
            Number::U8(v) => v.into(),
            Number::U16(v) => v.into(),
            Number::U32(v) => v.into(),
            Number::U64(v) => v.into(),
            Number::F32(v) => float_json(v as f64),
            Number::F64(v) => float_json(v),
        }
    }
}

fn float_json(v: f64) -> serde_json::Value {
    serde_json::Number::from_f64(v)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::I8(v) => write!(f, "{}", v),
            Number::I16(v) => write!(f, "{}", v),
            Number::I32(v) => write!(f, "{}", v),
            Number::I64(v) => write!(f, "{}", v),
            Number::U8(v) => write!(f, "{}", v),
            Number::U16(v) => write!(f, "{}", v),
            Number::U32(v) => write!(f, "{}", v),
            Number::U64(v) => write!(f, "{}", v),
            Number::F32(v) => write!(f, "{}", v),
            Number::F64(v) => write!(f, "{}", v),
        }
    }
}

/// 缓存值
///
/// 只有 `Number` 参与自增/自减；其余变体对存储而言是不透明的负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CacheValue {
    Number(Number),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl CacheValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, CacheValue::Number(_))
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            CacheValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CacheValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CacheValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// 转换为无类型的 JSON 值（同步消息与类型化读取使用）
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CacheValue::Number(n) => n.to_json(),
            CacheValue::Text(s) => serde_json::Value::String(s.clone()),
            CacheValue::Bytes(b) => serde_json::Value::from(b.clone()),
            CacheValue::Json(v) => v.clone(),
        }
    }

    /// 从无类型的 JSON 值还原
    ///
    /// 具体类型信息会丢失：整数还原为 `i64`（超出时为 `u64`），
    /// 其它数字为 `f64`，字符串为 `Text`，其余保持为 `Json`
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CacheValue::Number(Number::I64(i))
                } else if let Some(u) = n.as_u64() {
                    CacheValue::Number(Number::U64(u))
                } else {
                    CacheValue::Number(Number::F64(n.as_f64().unwrap_or_default()))
                }
            }
            serde_json::Value::String(s) => CacheValue::Text(s),
            other => CacheValue::Json(other),
        }
    }
}

impl From<String> for CacheValue {
    fn from(v: String) -> Self {
        CacheValue::Text(v)
    }
}

impl From<&str> for CacheValue {
    fn from(v: &str) -> Self {
        CacheValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(v: Vec<u8>) -> Self {
        CacheValue::Bytes(v)
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(v: serde_json::Value) -> Self {
        CacheValue::Json(v)
    }
}

impl From<Number> for CacheValue {
    fn from(v: Number) -> Self {
        CacheValue::Number(v)
    }
}

/// 指定宽度的数值类型
///
/// 用于 `increment_as`/`decrement_as` 这类要求存储值宽度与调用宽度一致的操作
pub trait Numeric: Copy + Send + Sync + 'static {
    const KIND: &'static str;

    fn from_number(n: Number) -> Option<Self>;

    fn into_number(self) -> Number;

    /// 回绕加减（浮点为普通加减）
    fn apply(self, rhs: Self, subtract: bool) -> Self;
}

macro_rules! impl_numeric_int {
    ($($t:ty => $variant:ident, $kind:literal);* $(;)?) => {
        $(
            impl Numeric for $t {
                const KIND: &'static str = $kind;

                fn from_number(n: Number) -> Option<Self> {
                    match n {
                        Number::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn into_number(self) -> Number {
                    Number::$variant(self)
                }

                fn apply(self, rhs: Self, subtract: bool) -> Self {
                    if subtract {
                        self.wrapping_sub(rhs)
                    } else {
                        self.wrapping_add(rhs)
                    }
                }
            }

            impl From<$t> for CacheValue {
                fn from(v: $t) -> Self {
                    CacheValue::Number(Number::$variant(v))
                }
            }
        )*
    };
}

macro_rules! impl_numeric_float {
    ($($t:ty => $variant:ident, $kind:literal);* $(;)?) => {
        $(
            impl Numeric for $t {
                const KIND: &'static str = $kind;

                fn from_number(n: Number) -> Option<Self> {
                    match n {
                        Number::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn into_number(self) -> Number {
                    Number::$variant(self)
                }

                fn apply(self, rhs: Self, subtract: bool) -> Self {
                    if subtract {
                        self - rhs
                    } else {
                        self + rhs
                    }
                }
            }

            impl From<$t> for CacheValue {
                fn from(v: $t) -> Self {
                    CacheValue::Number(Number::$variant(v))
                }
            }
        )*
    };
}

impl_numeric_int! {
    i8 => I8, "i8";
    i16 => I16, "i16";
    i32 => I32, "i32";
    i64 => I64, "i64";
    u8 => U8, "u8";
    u16 => U16, "u16";
    u32 => U32, "u32";
    u64 => U64, "u64";
}

impl_numeric_float! {
    f32 => F32, "f32";
    f64 => F64, "f64";
}

/// 过期策略
///
/// 线上传输时以有符号纳秒表示：`0` 为默认过期，负数为永不过期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    /// 使用存储配置的默认过期时间
    #[default]
    Default,
    /// 无论默认值如何都不过期
    Never,
    /// 相对当前时间的存活时长
    After(Duration),
}

impl Expiration {
    pub fn from_nanos(nanos: i64) -> Self {
        match nanos {
            0 => Expiration::Default,
            n if n < 0 => Expiration::Never,
            n => Expiration::After(Duration::from_nanos(n as u64)),
        }
    }

    pub fn as_nanos(&self) -> i64 {
        match self {
            Expiration::Default => 0,
            Expiration::Never => -1,
            Expiration::After(d) if d.is_zero() => 0,
            Expiration::After(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        }
    }

    /// 解析为具体存活时长，`None` 表示永不过期
    pub fn resolve(self, default: Option<Duration>) -> Option<Duration> {
        match self {
            Expiration::Default => default,
            Expiration::After(d) if d.is_zero() => default,
            Expiration::After(d) => Some(d),
            Expiration::Never => None,
        }
    }

    /// 计算绝对过期时间
    pub fn deadline(self, default: Option<Duration>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.resolve(default)
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .and_then(|d| now.checked_add_signed(d))
    }
}

impl From<Duration> for Expiration {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Expiration::Default
        } else {
            Expiration::After(d)
        }
    }
}

/// 缓存条目
///
/// 观察到过期时间已过的条目在任何读路径上都视为不存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem {
    pub value: CacheValue,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheItem {
    pub fn new(value: CacheValue, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { value, expires_at }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(t) if now > t)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的错误类型和处理机制。

use thiserror::Error;

/// 缓存系统错误类型枚举
///
/// 本地存储的错误总是同步返回给调用方，后台任务（清理、镜像重建、同步消费）
/// 只记录日志并继续处理下一项
#[derive(Error, Debug)]
pub enum CacheError {
    /// `add` 作用于一个仍然有效的键
    #[error("Item {0} already exists")]
    AlreadyExists(String),

    /// `replace`/`increment`/`decrement` 作用于不存在或已过期的键
    #[error("Item {0} not found")]
    NotFound(String),

    /// 数值操作作用于非数值，或数值宽度与请求不符
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// 构造期检测到的配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// 消息通道或远端存储的传输错误
    #[error("Transport error: {0}")]
    Transport(String),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// 缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;

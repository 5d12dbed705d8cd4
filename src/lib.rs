//! cachepool - 带常驻镜像的进程内TTL缓存
//!
//! 提供本地TTL缓存（过期清理与常驻镜像）、本地/全局两级的分层缓存，
//! 以及跨实例的写入同步总线。

#![doc(html_root_url = "https://docs.rs/cachepool/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod pool;
pub mod serialization;
pub mod sync;
pub mod telemetry;
pub mod value;

// Re-export commonly used items
pub use client::{CacheExt, CacheOps, LocalCache, RedisCache, TieredCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use manager::{CacheManager, CacheService};
pub use pool::CachePool;
pub use sync::{MemoryBroker, SyncConsumer, SyncPublisher, SyncTransport};
pub use value::{CacheItem, CacheValue, Expiration, Number};

/// cachepool 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

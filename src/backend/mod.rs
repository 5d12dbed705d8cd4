//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的存储后端，包括本地TTL存储及其后台任务，以及Redis远端存储。

pub mod janitor;
pub mod memory;
pub mod redis_store;
pub mod sticky;

pub use janitor::Janitor;
pub use memory::{EvictionCallback, MemoryStore};
pub use redis_store::{RedisBackend, SetMode};
pub use sticky::{is_sticky, StickyMirror, STICKY_THRESHOLD};

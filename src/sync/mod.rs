//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了跨实例的同步总线：消息格式、广播传输、发布者和消费者。

pub mod bus;
pub mod message;
pub mod redis_stream;
pub mod transport;

pub use bus::{SyncConsumer, SyncPublisher};
pub use message::{SyncMessage, CONTENT_TYPE};
pub use redis_stream::RedisStreamTransport;
pub use transport::{Delivery, MemoryBroker, SyncSubscription, SyncTransport, EXCHANGE_NAME};

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步广播命令的实现。

use crate::cli::PublishArgs;
use crate::config::Config;
use crate::sync::{RedisStreamTransport, SyncPublisher};
use crate::value::{CacheValue, Expiration};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

pub async fn execute(args: &PublishArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Invalid configuration: {}", args.config.display()))?;
    let service = config
        .services
        .get(&args.service)
        .with_context(|| format!("Service '{}' not found", args.service))?;
    let sync = service
        .sync
        .as_ref()
        .with_context(|| format!("Service '{}' has no sync section", args.service))?;

    let transport = RedisStreamTransport::from_config(sync, service.redis.as_ref()).await?;
    let publisher = SyncPublisher::new(Arc::new(transport));

    let value = if args.json {
        CacheValue::Json(serde_json::from_str(&args.value).context("Value is not valid JSON")?)
    } else {
        CacheValue::from(args.value.as_str())
    };
    let exp = match args.ttl_secs {
        None | Some(0) => Expiration::Default,
        Some(secs) if secs < 0 => Expiration::Never,
        Some(secs) => Expiration::After(Duration::from_secs(secs.unsigned_abs())),
    };

    publisher.publish(&args.key, &value, exp).await?;
    println!("Published '{}' on service {}", args.key, args.service);
    Ok(())
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步监听命令的实现。

use crate::cli::ListenArgs;
use crate::config::Config;
use crate::manager::CacheService;
use crate::metrics::{get_metrics_string, GLOBAL_METRICS};
use anyhow::{Context, Result};
use std::time::Duration;

pub async fn execute(args: &ListenArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Invalid configuration: {}", args.config.display()))?;
    let queue = config
        .services
        .get(&args.service)
        .and_then(|s| s.sync.as_ref())
        .map(|s| s.queue.clone())
        .with_context(|| format!("Service '{}' has no sync section", args.service))?;

    let service = CacheService::from_config(&args.service, &config).await?;
    println!(
        "Listening on queue {} for service {}. Press Ctrl-C to stop.",
        queue, args.service
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                println!(
                    "items={} applied={} skipped={}",
                    service.local().item_count(),
                    GLOBAL_METRICS.sync_count(&queue, "applied"),
                    GLOBAL_METRICS.sync_count(&queue, "decode_error"),
                );
            }
        }
    }

    service.shutdown().await?;
    println!("Stopped.\n\n{}", get_metrics_string());
    Ok(())
}

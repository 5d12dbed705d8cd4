//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了配置检查命令的实现。

use crate::cli::CheckArgs;
use crate::config::Config;
use anyhow::{Context, Result};

pub async fn execute(args: &CheckArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Invalid configuration: {}", args.config.display()))?;

    println!("=== Configuration OK ===\n");

    if config.services.is_empty() {
        println!("No cache services configured.");
        return Ok(());
    }

    let mut names: Vec<&String> = config.services.keys().collect();
    names.sort();
    for name in names {
        let service = &config.services[name];
        let settings = service.local_settings(&config.global);
        println!("Service: {}", name);
        match settings.default_expiration {
            Some(ttl) => println!("  Default TTL:     {}s", ttl.as_secs()),
            None => println!("  Default TTL:     never"),
        }
        println!("  Cleanup:         {}s", settings.cleanup_interval.as_secs());
        if settings.sticky_interval.is_zero() {
            println!("  Sticky mirror:   disabled");
        } else {
            println!("  Sticky mirror:   {}s", settings.sticky_interval.as_secs());
        }
        if let Some(redis) = &service.redis {
            println!("  Global tier:     redis (namespace {})", redis.namespace);
        }
        if let Some(sync) = &service.sync {
            println!(
                "  Sync bus:        queue {}{}",
                sync.queue,
                if sync.consume { "" } else { " (publish only)" }
            );
        }
        println!();
    }

    Ok(())
}

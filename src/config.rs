//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_VERSION_FIELD: &str = "config_version";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
}

/// 全局配置
///
/// 定义适用于所有服务的本地缓存默认值
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 默认的缓存过期时间（秒），0表示默认永不过期
    pub default_ttl_secs: u64,
    /// 过期清理间隔（秒），0表示禁用后台清理
    pub cleanup_interval_secs: u64,
    /// 常驻镜像重建间隔（秒），0表示禁用常驻镜像
    pub sticky_interval_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            cleanup_interval_secs: 1800,
            sticky_interval_secs: 600,
        }
    }
}

/// 服务配置
///
/// 本地缓存总是存在；`redis` 存在时启用全局层，`sync` 存在时启用跨实例同步
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// 覆盖全局默认过期时间（秒）
    pub default_ttl_secs: Option<u64>,
    /// 覆盖全局清理间隔（秒）
    pub cleanup_interval_secs: Option<u64>,
    /// 覆盖全局常驻镜像重建间隔（秒）
    pub sticky_interval_secs: Option<u64>,
    /// 全局层（Redis）配置
    pub redis: Option<RedisConfig>,
    /// 同步总线配置
    pub sync: Option<SyncConfig>,
}

/// 合并全局默认值后的本地缓存参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSettings {
    pub default_expiration: Option<Duration>,
    pub cleanup_interval: Duration,
    pub sticky_interval: Duration,
}

impl ServiceConfig {
    pub fn local_settings(&self, global: &GlobalConfig) -> LocalSettings {
        let ttl = self.default_ttl_secs.unwrap_or(global.default_ttl_secs);
        LocalSettings {
            default_expiration: (ttl > 0).then(|| Duration::from_secs(ttl)),
            cleanup_interval: Duration::from_secs(
                self.cleanup_interval_secs
                    .unwrap_or(global.cleanup_interval_secs),
            ),
            sticky_interval: Duration::from_secs(
                self.sticky_interval_secs
                    .unwrap_or(global.sticky_interval_secs),
            ),
        }
    }
}

/// Redis 全局层配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisConfig {
    /// 连接字符串
    pub connection_string: SecretString,
    /// 键名前缀，实际键为 `{namespace}:{key}`
    pub namespace: String,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 全局层默认TTL（秒）；未设置时沿用服务的默认过期时间，0表示永不过期
    pub default_ttl_secs: Option<u64>,
    /// 是否对非数值负载启用gzip压缩
    pub compress: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            namespace: "cachepool".to_string(),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            enable_tls: false,
            default_ttl_secs: None,
            compress: false,
        }
    }
}

impl RedisConfig {
    /// 带 TLS 方案改写的连接地址
    pub fn connection_url(&self) -> String {
        resolve_url(&self.connection_string, self.enable_tls)
    }
}

/// 同步总线配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SyncConfig {
    /// 本实例的队列名（消费组），各实例必须互不相同
    pub queue: String,
    /// 同步总线使用的 Redis；未设置时复用 `redis.connection_string`
    pub connection_string: Option<SecretString>,
    pub enable_tls: bool,
    /// 广播流的近似最大长度
    pub stream_max_len: usize,
    /// 单次阻塞读取的最长等待（毫秒）
    pub block_ms: u64,
    /// 是否启动本实例的消费者
    pub consume: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue: String::new(),
            connection_string: None,
            enable_tls: false,
            stream_max_len: 10_000,
            block_ms: 2000,
            consume: true,
        }
    }
}

pub(crate) fn resolve_url(secret: &SecretString, enable_tls: bool) -> String {
    let raw = secret.expose_secret();
    if enable_tls && !raw.starts_with("rediss://") {
        raw.replace("redis://", "rediss://")
    } else {
        raw.to_string()
    }
}

impl Config {
    /// 从 TOML 文件读取配置并校验
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// 从 TOML 文本解析配置并校验
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| CacheError::Configuration(format!("invalid TOML: {}", e)))?;
        config.validate().map_err(CacheError::Configuration)?;
        Ok(config)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有必需的字段都已设置，并且值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        // 验证配置版本
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.global.default_ttl_secs > 86400 * 30 {
            return Err(
                "Global default_ttl_secs cannot exceed 30 days (2592000 seconds)".to_string(),
            );
        }

        check_intervals(
            "Global",
            self.global.cleanup_interval_secs,
            self.global.sticky_interval_secs,
        )?;

        let mut queues: HashMap<&str, &str> = HashMap::new();

        for (name, service) in &self.services {
            // 验证服务名称
            if name.is_empty() {
                return Err("Service name cannot be empty".to_string());
            }

            if name.len() > 64 {
                return Err(format!(
                    "Service '{}' exceeds maximum length of 64 characters",
                    name
                ));
            }

            let cleanup = service
                .cleanup_interval_secs
                .unwrap_or(self.global.cleanup_interval_secs);
            let sticky = service
                .sticky_interval_secs
                .unwrap_or(self.global.sticky_interval_secs);
            check_intervals(&format!("Service '{}'", name), cleanup, sticky)?;

            if let Some(redis) = &service.redis {
                if redis.namespace.is_empty() || redis.namespace.contains(char::is_whitespace) {
                    return Err(format!(
                        "Service '{}' redis namespace must be non-empty and contain no whitespace",
                        name
                    ));
                }

                if redis.connection_string.expose_secret().is_empty() {
                    return Err(format!(
                        "Service '{}' redis connection_string cannot be empty",
                        name
                    ));
                }

                // 验证连接超时
                let timeout = redis.connection_timeout_ms;
                if !(100..=30000).contains(&timeout) {
                    return Err(format!(
                        "Service '{}' connection_timeout_ms must be between 100 and 30000 ms",
                        name
                    ));
                }

                // 验证命令超时
                let timeout = redis.command_timeout_ms;
                if !(100..=60000).contains(&timeout) {
                    return Err(format!(
                        "Service '{}' command_timeout_ms must be between 100 and 60000 ms",
                        name
                    ));
                }
            }

            if let Some(sync) = &service.sync {
                if sync.queue.is_empty() {
                    return Err(format!("Service '{}' sync queue cannot be empty", name));
                }

                if let Some(other) = queues.insert(sync.queue.as_str(), name.as_str()) {
                    return Err(format!(
                        "Services '{}' and '{}' share the sync queue '{}'",
                        other, name, sync.queue
                    ));
                }

                if sync.connection_string.is_none() && service.redis.is_none() {
                    return Err(format!(
                        "Service '{}' sync needs a connection_string or a redis section",
                        name
                    ));
                }

                if sync.stream_max_len == 0 {
                    return Err(format!(
                        "Service '{}' sync stream_max_len cannot be zero",
                        name
                    ));
                }

                if !(100..=60000).contains(&sync.block_ms) {
                    return Err(format!(
                        "Service '{}' sync block_ms must be between 100 and 60000 ms",
                        name
                    ));
                }
            }
        }

        Ok(())
    }
}

fn check_intervals(scope: &str, cleanup: u64, sticky: u64) -> std::result::Result<(), String> {
    if cleanup > 0 && sticky > cleanup {
        return Err(format!(
            "{} sticky_interval_secs ({}) must be <= cleanup_interval_secs ({})",
            scope, sticky, cleanup
        ));
    }
    Ok(())
}

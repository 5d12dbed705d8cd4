//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的指标收集和监控功能。

use dashmap::DashMap;
use lazy_static::lazy_static;
use std::fmt::Write;
use std::sync::Arc;

/// 指标收集器
///
/// 用于收集和存储缓存系统的各种运行时指标
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "cache:layer:op:result"
    pub requests_total: Arc<DashMap<String, u64>>,
    /// 同步总线消息统计
    /// key: "queue:event"
    pub sync_messages: Arc<DashMap<String, u64>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `cache` - 缓存名称
    /// * `layer` - 缓存层（local/mirror/global/tiered）
    /// * `op` - 操作类型（get/set/delete）
    /// * `result` - 操作结果（hit/miss/ok/error）
    pub fn record_request(&self, cache: &str, layer: &str, op: &str, result: &str) {
        let key = format!("{}:{}:{}:{}", cache, layer, op, result);
        *self.requests_total.entry(key).or_insert(0) += 1;
    }

    /// 记录同步总线事件（published/applied/decode_error/transport_error）
    pub fn record_sync(&self, queue: &str, event: &str) {
        let key = format!("{}:{}", queue, event);
        *self.sync_messages.entry(key).or_insert(0) += 1;
    }

    /// 读取单个请求计数
    pub fn request_count(&self, cache: &str, layer: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}:{}", cache, layer, op, result);
        self.requests_total.get(&key).map(|v| *v).unwrap_or(0)
    }

    pub fn sync_count(&self, queue: &str, event: &str) -> u64 {
        let key = format!("{}:{}", queue, event);
        self.sync_messages.get(&key).map(|v| *v).unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为文本，用于监控系统采集
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut output = String::new();

    let mut requests: Vec<(String, u64)> = metrics
        .requests_total
        .iter()
        .map(|e| (e.key().clone(), *e.value()))
        .collect();
    requests.sort();
    for (k, v) in requests {
        let parts: Vec<&str> = k.splitn(4, ':').collect();
        if let [cache, layer, op, result] = parts.as_slice() {
            let _ = writeln!(
                output,
                "cache_requests_total{{cache=\"{}\", layer=\"{}\", operation=\"{}\", result=\"{}\"}} {}",
                cache, layer, op, result, v
            );
        }
    }

    let mut sync: Vec<(String, u64)> = metrics
        .sync_messages
        .iter()
        .map(|e| (e.key().clone(), *e.value()))
        .collect();
    sync.sort();
    for (k, v) in sync {
        if let Some((queue, event)) = k.rsplit_once(':') {
            let _ = writeln!(
                output,
                "cache_sync_messages_total{{queue=\"{}\", event=\"{}\"}} {}",
                queue, event, v
            );
        }
    }
    output
}

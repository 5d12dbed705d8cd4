//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了常驻镜像：将长期有效的非数值条目复制到无锁快照中，
//! 让高频读取绕开内存存储的读写锁。

use super::memory::MemoryStore;
use crate::error::{CacheError, Result};
use crate::value::CacheItem;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 剩余存活时间超过该阈值的条目视为常驻
pub const STICKY_THRESHOLD: Duration = Duration::from_secs(30 * 60);

/// 判断条目是否常驻
///
/// 数值永远不常驻；其余值在永不过期或剩余时间超过阈值时常驻
pub fn is_sticky(item: &CacheItem, now: DateTime<Utc>) -> bool {
    if item.value.is_numeric() {
        return false;
    }
    match item.expires_at {
        None => true,
        Some(deadline) => (deadline - now)
            .to_std()
            .map(|remaining| remaining > STICKY_THRESHOLD)
            .unwrap_or(false),
    }
}

type Snapshot = HashMap<String, CacheItem>;

enum MirrorCommand {
    /// 按存储中的当前状态刷新单个键
    Refresh(String),
    /// 清空镜像
    Clear,
}

/// 读者与镜像任务共享的状态
struct MirrorState {
    snapshot: ArcSwap<Snapshot>,
    /// 全量重建期间为 true
    rebuilding: AtomicBool,
    /// 尚未被任务应用的增量更新，按键计数
    pending: DashMap<String, usize>,
    pending_total: AtomicUsize,
    /// 尚未被任务应用的清空请求
    pending_clear: AtomicUsize,
}

impl MirrorState {
    fn finish_refresh(&self, key: &str) {
        if let Some(mut count) = self.pending.get_mut(key) {
            *count = count.saturating_sub(1);
        }
        self.pending.remove_if(key, |_, count| *count == 0);
        self.pending_total.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 常驻镜像
///
/// 只有一个后台任务写镜像：周期性全量重建和增量刷新都在同一个消息循环中执行。
/// 读者通过原子快照读取，永远看不到重建了一半的镜像
pub struct StickyMirror {
    state: Arc<MirrorState>,
    tx: mpsc::UnboundedSender<MirrorCommand>,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StickyMirror {
    /// 启动镜像任务
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称，用于日志
    /// * `store` - 被镜像的存储
    /// * `interval` - 全量重建周期，必须大于零
    pub fn start(name: &str, store: Arc<MemoryStore>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(CacheError::Configuration(
                "sticky interval must be positive".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            CacheError::Configuration(format!(
                "cache {} needs a tokio runtime to run its sticky mirror",
                name
            ))
        })?;

        let state = Arc::new(MirrorState {
            snapshot: ArcSwap::from_pointee(Snapshot::new()),
            rebuilding: AtomicBool::new(false),
            pending: DashMap::new(),
            pending_total: AtomicUsize::new(0),
            pending_clear: AtomicUsize::new(0),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let handle = runtime.spawn(run_mirror(
            name.to_string(),
            store,
            state.clone(),
            rx,
            token.clone(),
            interval,
        ));

        Ok(Self {
            state,
            tx,
            token,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// 从镜像读取
    ///
    /// 返回 `None` 表示调用方应回落到内存存储：未命中、已过期、
    /// 该键还有未应用的更新，或镜像已停止
    pub fn lookup(&self, key: &str) -> Option<CacheItem> {
        if self.token.is_cancelled() {
            return None;
        }
        if self.state.pending_clear.load(Ordering::SeqCst) > 0 {
            return None;
        }
        if self.state.pending_total.load(Ordering::SeqCst) > 0
            && self.state.pending.contains_key(key)
        {
            return None;
        }
        let snapshot = self.state.snapshot.load();
        snapshot
            .get(key)
            .filter(|item| !item.is_expired_at(Utc::now()))
            .cloned()
    }

    /// 存储中 `key` 已被写入或删除后调用
    ///
    /// 只有镜像已持有该键、或正在全量重建时才发送增量更新
    pub fn notify_write(&self, key: &str) {
        if self.token.is_cancelled() {
            return;
        }
        let tracked = self.state.rebuilding.load(Ordering::SeqCst)
            || self.state.snapshot.load().contains_key(key);
        if !tracked {
            return;
        }
        *self.state.pending.entry(key.to_string()).or_insert(0) += 1;
        self.state.pending_total.fetch_add(1, Ordering::SeqCst);
        if self
            .tx
            .send(MirrorCommand::Refresh(key.to_string()))
            .is_err()
        {
            self.state.finish_refresh(key);
        }
    }

    /// 存储被清空后调用
    pub fn notify_flush(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.state.pending_clear.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(MirrorCommand::Clear).is_err() {
            self.state.pending_clear.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.snapshot.load().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_rebuilding(&self) -> bool {
        self.state.rebuilding.load(Ordering::SeqCst)
    }

    /// 通知任务停止，不等待其退出
    ///
    /// 停止后镜像不再接收增量更新，读取全部回落到存储
    pub fn stop(&self) {
        self.token.cancel();
        self.state.snapshot.store(Arc::new(Snapshot::new()));
    }

    /// 停止任务并等待其退出
    pub async fn shutdown(&self) {
        self.token.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.state.snapshot.store(Arc::new(Snapshot::new()));
    }
}

impl Drop for StickyMirror {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_mirror(
    name: String,
    store: Arc<MemoryStore>,
    state: Arc<MirrorState>,
    mut rx: mpsc::UnboundedReceiver<MirrorCommand>,
    token: CancellationToken,
    interval: Duration,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!("StickyMirror: 启动，cache={}, interval={:?}", name, interval);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => rebuild(&name, &store, &state),
            cmd = rx.recv() => match cmd {
                Some(MirrorCommand::Refresh(key)) => {
                    refresh(&store, &state, &key);
                    state.finish_refresh(&key);
                }
                Some(MirrorCommand::Clear) => {
                    state.snapshot.store(Arc::new(Snapshot::new()));
                    state.pending_clear.fetch_sub(1, Ordering::SeqCst);
                }
                None => break,
            },
        }
    }
    info!("StickyMirror: cache={} 已停止", name);
}

fn rebuild(name: &str, store: &MemoryStore, state: &MirrorState) {
    state.rebuilding.store(true, Ordering::SeqCst);
    let now = Utc::now();
    let mirrored: Snapshot = store
        .items()
        .into_iter()
        .filter(|(_, item)| is_sticky(item, now))
        .collect();
    let count = mirrored.len();
    state.snapshot.store(Arc::new(mirrored));
    state.rebuilding.store(false, Ordering::SeqCst);
    debug!("StickyMirror: cache={} 重建完成，常驻条目 {} 个", name, count);
}

fn refresh(store: &MemoryStore, state: &MirrorState, key: &str) {
    let current = state.snapshot.load_full();
    let next = store
        .get_item(key)
        .filter(|item| is_sticky(item, Utc::now()));
    match next {
        Some(item) => {
            let mut updated = (*current).clone();
            updated.insert(key.to_string(), item);
            state.snapshot.store(Arc::new(updated));
        }
        None if current.contains_key(key) => {
            let mut updated = (*current).clone();
            updated.remove(key);
            state.snapshot.store(Arc::new(updated));
        }
        None => {}
    }
}

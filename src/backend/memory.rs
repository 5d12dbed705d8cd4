//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了带过期时间的内存存储，是本地缓存的权威数据源。

use crate::error::{CacheError, Result};
use crate::value::{CacheItem, CacheValue, Expiration, Number, Numeric};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 淘汰回调：显式删除和过期清理时调用，覆盖写入时不调用
pub type EvictionCallback = Arc<dyn Fn(&str, &CacheValue) + Send + Sync>;

type ItemMap = HashMap<String, CacheItem, ahash::RandomState>;

/// TTL 内存存储
///
/// 读操作持有共享锁，写操作持有独占锁；淘汰回调永远在释放锁之后执行
pub struct MemoryStore {
    /// 默认过期时间，`None` 表示默认永不过期
    default_expiration: Option<Duration>,
    items: RwLock<ItemMap>,
    on_evicted: RwLock<Option<EvictionCallback>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("default_expiration", &self.default_expiration)
            .field("items", &self.items.read().len())
            .finish()
    }
}

impl MemoryStore {
    /// 创建新的内存存储
    ///
    /// # 参数
    ///
    /// * `default_expiration` - 默认过期时间，`None` 或零表示默认永不过期
    pub fn new(default_expiration: Option<Duration>) -> Self {
        Self::from_items(default_expiration, HashMap::new())
    }

    /// 从已有条目创建内存存储，例如反序列化得到的快照
    pub fn from_items(
        default_expiration: Option<Duration>,
        items: HashMap<String, CacheItem>,
    ) -> Self {
        Self {
            default_expiration: default_expiration.filter(|d| !d.is_zero()),
            items: RwLock::new(items.into_iter().collect()),
            on_evicted: RwLock::new(None),
        }
    }

    pub fn default_expiration(&self) -> Option<Duration> {
        self.default_expiration
    }

    fn make_item(&self, value: CacheValue, exp: Expiration) -> CacheItem {
        CacheItem::new(value, exp.deadline(self.default_expiration, Utc::now()))
    }

    /// 无条件写入
    pub fn set(&self, key: &str, value: CacheValue, exp: Expiration) {
        let item = self.make_item(value, exp);
        self.items.write().insert(key.to_string(), item);
    }

    pub fn set_default(&self, key: &str, value: CacheValue) {
        self.set(key, value, Expiration::Default);
    }

    /// 仅当键不存在（或已过期）时写入
    pub fn add(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        let item = self.make_item(value, exp);
        let mut items = self.items.write();
        if Self::live(&items, key).is_some() {
            return Err(CacheError::AlreadyExists(key.to_string()));
        }
        items.insert(key.to_string(), item);
        Ok(())
    }

    /// 仅当键存在且未过期时写入
    pub fn replace(&self, key: &str, value: CacheValue, exp: Expiration) -> Result<()> {
        let item = self.make_item(value, exp);
        let mut items = self.items.write();
        if Self::live(&items, key).is_none() {
            return Err(CacheError::NotFound(key.to_string()));
        }
        items.insert(key.to_string(), item);
        Ok(())
    }

    fn live<'a>(items: &'a ItemMap, key: &str) -> Option<&'a CacheItem> {
        items.get(key).filter(|item| !item.is_expired_at(Utc::now()))
    }

    pub fn get(&self, key: &str) -> Option<CacheValue> {
        let items = self.items.read();
        Self::live(&items, key).map(|item| item.value.clone())
    }

    pub fn get_item(&self, key: &str) -> Option<CacheItem> {
        let items = self.items.read();
        Self::live(&items, key).cloned()
    }

    pub fn get_with_expiration(
        &self,
        key: &str,
    ) -> Option<(CacheValue, Option<chrono::DateTime<Utc>>)> {
        self.get_item(key).map(|item| (item.value, item.expires_at))
    }

    /// 在独占锁内对数值条目做原地修改
    fn update_number<F>(&self, key: &str, f: F) -> Result<Number>
    where
        F: FnOnce(Number) -> Result<Number>,
    {
        let mut items = self.items.write();
        let now = Utc::now();
        let item = match items.get_mut(key) {
            Some(item) if !item.is_expired_at(now) => item,
            _ => return Err(CacheError::NotFound(key.to_string())),
        };
        let current = match &item.value {
            CacheValue::Number(n) => *n,
            _ => {
                return Err(CacheError::TypeMismatch(format!(
                    "the value for {} is not a number",
                    key
                )))
            }
        };
        let next = f(current)?;
        item.value = CacheValue::Number(next);
        Ok(next)
    }

    /// 以 `n` 增加任意宽度的数值，结果保持原宽度
    pub fn increment(&self, key: &str, n: i64) -> Result<()> {
        self.update_number(key, |cur| Ok(cur.offset(n, false)))
            .map(|_| ())
    }

    pub fn decrement(&self, key: &str, n: i64) -> Result<()> {
        self.update_number(key, |cur| Ok(cur.offset(n, true)))
            .map(|_| ())
    }

    /// 浮点自增，仅适用于 `f32`/`f64`
    pub fn increment_float(&self, key: &str, n: f64) -> Result<()> {
        self.update_number(key, |cur| float_offset(key, cur, n, false))
            .map(|_| ())
    }

    pub fn decrement_float(&self, key: &str, n: f64) -> Result<()> {
        self.update_number(key, |cur| float_offset(key, cur, n, true))
            .map(|_| ())
    }

    /// 指定宽度的自增，返回新值
    pub fn increment_as<T: Numeric>(&self, key: &str, n: T) -> Result<T> {
        self.typed_offset(key, n, false)
    }

    /// 指定宽度的自减，返回新值
    pub fn decrement_as<T: Numeric>(&self, key: &str, n: T) -> Result<T> {
        self.typed_offset(key, n, true)
    }

    fn typed_offset<T: Numeric>(&self, key: &str, n: T, subtract: bool) -> Result<T> {
        let next = self.update_number(key, |cur| {
            let v = T::from_number(cur).ok_or_else(|| {
                CacheError::TypeMismatch(format!(
                    "the value for {} is {}, not {}",
                    key,
                    cur.kind(),
                    T::KIND
                ))
            })?;
            Ok(v.apply(n, subtract).into_number())
        })?;
        T::from_number(next)
            .ok_or_else(|| CacheError::TypeMismatch(format!("the value for {} changed width", key)))
    }

    /// 删除条目；键不存在时什么也不做
    pub fn delete(&self, key: &str) {
        let removed = self.items.write().remove(key);
        if let Some(item) = removed {
            let callback = self.on_evicted.read().clone();
            if let Some(cb) = callback {
                cb(key, &item.value);
            }
        }
    }

    /// 扫描并删除所有过期条目，返回删除数量
    ///
    /// 回调在扫描结束、释放锁之后批量执行
    pub fn delete_expired(&self) -> usize {
        let now = Utc::now();
        let evicted: Vec<(String, CacheItem)> = {
            let mut items = self.items.write();
            let expired: Vec<String> = items
                .iter()
                .filter(|(_, item)| item.is_expired_at(now))
                .map(|(k, _)| k.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|k| items.remove(&k).map(|item| (k, item)))
                .collect()
        };
        let count = evicted.len();
        if count > 0 {
            debug!("MemoryStore: 清理过期条目 {} 个", count);
            let callback = self.on_evicted.read().clone();
            if let Some(cb) = callback {
                for (key, item) in &evicted {
                    cb(key, &item.value);
                }
            }
        }
        count
    }

    /// 设置（或移除）淘汰回调
    pub fn set_eviction_callback(&self, callback: Option<EvictionCallback>) {
        *self.on_evicted.write() = callback;
    }

    /// 清空所有条目，不触发回调
    pub fn flush(&self) {
        *self.items.write() = ItemMap::default();
    }

    /// 返回所有未过期条目的快照
    pub fn items(&self) -> HashMap<String, CacheItem> {
        let now = Utc::now();
        self.items
            .read()
            .iter()
            .filter(|(_, item)| !item.is_expired_at(now))
            .map(|(k, item)| (k.clone(), item.clone()))
            .collect()
    }

    /// 返回条目数量，包括已过期但尚未清理的条目
    pub fn item_count(&self) -> usize {
        self.items.read().len()
    }

    /// 将全部条目以 JSON 写出
    ///
    /// 只在复制条目时持有读锁，序列化与写出在锁外进行
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let items: HashMap<String, CacheItem> = self
            .items
            .read()
            .iter()
            .map(|(k, item)| (k.clone(), item.clone()))
            .collect();
        serde_json::to_writer(writer, &items)?;
        Ok(())
    }

    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// 读入条目，已存在且未过期的键保持不变；返回读入的键
    pub fn load<R: Read>(&self, reader: R) -> Result<Vec<String>> {
        let loaded: HashMap<String, CacheItem> = serde_json::from_reader(reader)?;
        let now = Utc::now();
        let mut items = self.items.write();
        let mut keys = Vec::new();
        for (key, item) in loaded {
            let keep_existing = items
                .get(&key)
                .is_some_and(|existing| !existing.is_expired_at(now));
            if !keep_existing {
                keys.push(key.clone());
                items.insert(key, item);
            }
        }
        Ok(keys)
    }

    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<String>> {
        self.load(BufReader::new(File::open(path)?))
    }
}

fn float_offset(key: &str, cur: Number, n: f64, subtract: bool) -> Result<Number> {
    cur.offset_float(n, subtract).ok_or_else(|| {
        CacheError::TypeMismatch(format!(
            "the value for {} is {}, not a float",
            key,
            cur.kind()
        ))
    })
}

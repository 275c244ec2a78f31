use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use super::core::{is_under, KvError, KvPair, KvStore};
use crate::impl_from;

/// MemoryStore 配置结构体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, SmartDefault)]
#[serde(default)]
pub struct MemoryStoreConfig {
    /// 初始数据，key 为层级路径
    pub entries: BTreeMap<String, String>,

    /// 是否提供 watch_tree 能力
    #[default = true]
    pub watchable: bool,
}

/// 一个 watch_tree 订阅
struct TreeWatcher {
    prefix: String,
    snapshots: Sender<Vec<KvPair>>,
    stop: Receiver<()>,
}

/// 基于内存 BTreeMap 的层级 KV 存储
///
/// `list` 返回前缀下的全部后代，`put`/`delete` 会向匹配的 watch_tree 订阅推送快照
pub struct MemoryStore {
    map: RwLock<BTreeMap<String, Option<Vec<u8>>>>,
    watchers: Mutex<Vec<TreeWatcher>>,
    watchable: bool,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        let map = config
            .entries
            .into_iter()
            .map(|(k, v)| (normalize(&k), Some(v.into_bytes())))
            .collect();

        Self {
            map: RwLock::new(map),
            watchers: Mutex::new(Vec::new()),
            watchable: config.watchable,
            closed: AtomicBool::new(false),
        }
    }

    /// 写入一个键，并通知相关订阅
    pub fn put(&self, key: &str, value: impl Into<Vec<u8>>) {
        let key = normalize(key);
        self.map
            .write()
            .unwrap()
            .insert(key.clone(), Some(value.into()));
        self.notify(&key);
    }

    /// 写入一个没有值的键（目录）
    pub fn put_empty(&self, key: &str) {
        let key = normalize(key);
        self.map.write().unwrap().insert(key.clone(), None);
        self.notify(&key);
    }

    /// 删除一个键，键不存在时也返回成功
    pub fn delete(&self, key: &str) {
        let key = normalize(key);
        let removed = self.map.write().unwrap().remove(&key).is_some();
        if removed {
            self.notify(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(&self) -> Result<(), KvError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KvError::Closed);
        }
        Ok(())
    }

    /// 向前缀覆盖 `key` 的订阅推送最新快照，顺带清理已停止的订阅
    fn notify(&self, key: &str) {
        let mut watchers = self.watchers.lock().unwrap();
        watchers.retain(|w| {
            if !matches!(w.stop.try_recv(), Err(TryRecvError::Empty)) {
                return false;
            }
            if key != w.prefix && !is_under(&w.prefix, key) {
                return true;
            }
            let snapshot = self.snapshot(&w.prefix);
            w.snapshots.send(snapshot).is_ok()
        });
    }

    fn snapshot(&self, prefix: &str) -> Vec<KvPair> {
        self.map
            .read()
            .unwrap()
            .iter()
            .filter(|(k, _)| is_under(prefix, k))
            .map(|(k, v)| KvPair {
                key: k.clone(),
                value: v.clone(),
            })
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

impl_from!(MemoryStoreConfig => MemoryStore);

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<KvPair, KvError> {
        self.check_open()?;
        let key = normalize(key);
        let map = self.map.read().unwrap();
        match map.get(&key) {
            Some(value) => Ok(KvPair {
                key,
                value: value.clone(),
            }),
            None => Err(KvError::KeyNotFound),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, KvError> {
        self.check_open()?;
        let prefix = normalize(prefix);
        let pairs = self.snapshot(&prefix);
        if pairs.is_empty() && !self.map.read().unwrap().contains_key(&prefix) {
            return Err(KvError::KeyNotFound);
        }
        Ok(pairs)
    }

    fn watch_tree(
        &self,
        prefix: &str,
        stop: Receiver<()>,
    ) -> Result<Receiver<Vec<KvPair>>, KvError> {
        self.check_open()?;
        if !self.watchable {
            return Err(KvError::WatchUnsupported);
        }

        let prefix = normalize(prefix);
        let (tx, rx) = unbounded();
        // 订阅时先推送一次当前快照
        let _ = tx.send(self.snapshot(&prefix));
        self.watchers.lock().unwrap().push(TreeWatcher {
            prefix,
            snapshots: tx,
            stop,
        });
        Ok(rx)
    }

    fn close(&self) -> Result<(), KvError> {
        self.closed.store(true, Ordering::SeqCst);
        // drop 所有订阅的发送端，订阅方的快照流随之关闭
        self.watchers.lock().unwrap().clear();
        Ok(())
    }
}

fn normalize(key: &str) -> String {
    key.trim_matches('/').to_string()
}

//! KV 存储配置源
//!
//! 每次 load 从存储中重建前缀下的配置树并解码；
//! 存储支持 `watch_tree` 时，快照变化经防抖后作为变更信号发出

use anyhow::Result;
use crossbeam::channel;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::time::Duration;

use super::source::{Changes, Source};
use crate::decode::decode_node;
use crate::errors::{ClassError, WrapErr, TRANSPORT, UNAVAILABLE};
use crate::impl_from;
use crate::kv::{build_tree, normalize_prefix, ConsulStore, ConsulStoreConfig, KvError, KvStore};
use crate::watch::Debouncer;

#[derive(Debug, Clone, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct KvSourceConfig {
    /// 配置所在的前缀，首尾的 `/` 会被去掉
    pub prefix: String,
    /// 防抖窗口（毫秒）
    #[default = 500]
    pub debounce_ms: u64,
}

/// Consul 配置源的配置
///
/// ```
/// use cfg_loader::cfg::ConsulSourceConfig;
///
/// let config: ConsulSourceConfig = serde_json::from_str(r#"{
///     "prefix": "services/orders",
///     "consul": { "endpoint": "http://consul:8500" }
/// }"#).unwrap();
/// assert_eq!(config.source.prefix, "services/orders");
/// assert_eq!(config.source.debounce_ms, 500);
/// assert_eq!(config.consul.connection_timeout_secs, 10);
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsulSourceConfig {
    #[serde(flatten)]
    pub source: KvSourceConfig,
    pub consul: ConsulStoreConfig,
}

/// KV 存储配置源
///
/// 存储不支持 `watch_tree` 时仍然可以 load，但 `changes` 永远不会发出信号，
/// 可以通过 [`KvSource::live_reload`] 判断
pub struct KvSource<S: KvStore> {
    prefix: String,
    /// close 之后为 None
    store: Option<S>,
    debouncer: Debouncer,
    live_reload: bool,
    error: Option<ClassError>,
}

impl<S: KvStore> KvSource<S> {
    /// 创建配置源并订阅前缀下的变化
    ///
    /// 订阅失败（`WatchUnsupported` 除外）时不会失败，错误保留到 `load` 时返回
    pub fn new(config: KvSourceConfig, store: S) -> Self {
        let prefix = normalize_prefix(&config.prefix);
        let window = Duration::from_millis(config.debounce_ms);
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);

        let (debouncer, live_reload, error) = match store.watch_tree(&prefix, stop_rx) {
            Ok(snapshots) => {
                log::debug!("watching prefix {:?} with debounce window {:?}", prefix, window);
                let release = move || {
                    drop(stop_tx);
                    Ok(())
                };
                (Debouncer::spawn(snapshots, window, release), true, None)
            }
            Err(KvError::WatchUnsupported) => {
                log::warn!("store cannot watch prefix {:?}, changes will never fire", prefix);
                (Debouncer::idle(), false, None)
            }
            Err(e) => {
                log::warn!("watching prefix {:?} failed: {}", prefix, e);
                let error = UNAVAILABLE.wrap(e, format!("watching prefix {:?}", prefix));
                (Debouncer::idle(), false, Some(error))
            }
        };

        Self {
            prefix,
            store: Some(store),
            debouncer,
            live_reload,
            error,
        }
    }

    /// 创建一个无法连接的配置源，每次 load 都返回 `err`
    pub fn unavailable(config: KvSourceConfig, err: impl Into<anyhow::Error>) -> Self {
        let prefix = normalize_prefix(&config.prefix);
        let error = UNAVAILABLE.wrap(err, format!("connecting to store for prefix {:?}", prefix));
        Self {
            prefix,
            store: None,
            debouncer: Debouncer::idle(),
            live_reload: false,
            error: Some(error),
        }
    }

    /// 变更信号是否可用
    pub fn live_reload(&self) -> bool {
        self.live_reload
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn store(&self) -> Option<&S> {
        self.store.as_ref()
    }
}

impl KvSource<ConsulStore> {
    /// 连接 Consul，客户端创建失败时得到一个 [`unavailable`](Self::unavailable) 配置源
    pub fn consul(config: ConsulSourceConfig) -> Self {
        match ConsulStore::new(config.consul) {
            Ok(store) => Self::new(config.source, store),
            Err(e) => Self::unavailable(config.source, e),
        }
    }
}

impl_from!(ConsulSourceConfig => KvSource<ConsulStore>, via: consul);

impl<S: KvStore> Source for KvSource<S> {
    fn get<T: DeserializeOwned>(&self) -> Result<T> {
        if let Some(err) = &self.error {
            return Err(err.clone().into());
        }
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| UNAVAILABLE.error(format!("source for prefix {:?} is closed", self.prefix)))?;

        let tree = build_tree(store, &self.prefix)?;
        decode_node(&tree)
    }

    fn changes(&self) -> Changes {
        self.debouncer.changes()
    }

    /// 先停止监听，再关闭存储；两者的错误都会返回，监听的错误优先
    fn close(&mut self) -> Result<()> {
        let watch = self.debouncer.close();
        let store = match self.store.take() {
            Some(store) => store.close().wrap_err(&TRANSPORT, "closing store"),
            None => Ok(()),
        };
        watch.and(store)
    }
}

impl<S: KvStore> Drop for KvSource<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("closing source for prefix {:?} failed: {:#}", self.prefix, e);
        }
    }
}

use crossbeam::channel::Receiver;
use std::sync::Arc;
use thiserror::Error;

/// KV 存储相关错误类型
#[derive(Error, Debug)]
pub enum KvError {
    #[error("Key not found")]
    KeyNotFound,
    #[error("Watch not supported")]
    WatchUnsupported,
    #[error("Store closed")]
    Closed,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Other error: {0}")]
    Other(String),
}

/// 存储中的一个键值对
///
/// key 是以 `/` 分隔的层级路径，value 为原始字节，目录类的键可能没有值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl KvPair {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// 没有值的键
    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

/// 层级 KV 存储客户端
///
/// 配置加载只需要读取能力；`watch_tree` 是可选能力，默认实现返回 `KvError::WatchUnsupported`
pub trait KvStore: Send + Sync {
    /// 获取单个键，键不存在时返回 `KvError::KeyNotFound`
    fn get(&self, key: &str) -> Result<KvPair, KvError>;

    /// 列出 `prefix` 之下的键（不含 `prefix` 自身），可以是直接子键，也可以是全部后代
    ///
    /// `prefix` 自身和后代都不存在时返回 `KvError::KeyNotFound`；
    /// `prefix` 是一个没有后代的叶子时返回空列表
    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, KvError>;

    /// 监听 `prefix` 之下的变化，每次变化推送一份子键快照
    ///
    /// `stop` 的发送端被 drop 后停止监听
    fn watch_tree(
        &self,
        prefix: &str,
        stop: Receiver<()>,
    ) -> Result<Receiver<Vec<KvPair>>, KvError> {
        let _ = (prefix, stop);
        Err(KvError::WatchUnsupported)
    }

    /// 关闭存储连接
    fn close(&self) -> Result<(), KvError>;
}

impl<S: KvStore + ?Sized> KvStore for Box<S> {
    fn get(&self, key: &str) -> Result<KvPair, KvError> {
        (**self).get(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, KvError> {
        (**self).list(prefix)
    }

    fn watch_tree(
        &self,
        prefix: &str,
        stop: Receiver<()>,
    ) -> Result<Receiver<Vec<KvPair>>, KvError> {
        (**self).watch_tree(prefix, stop)
    }

    fn close(&self) -> Result<(), KvError> {
        (**self).close()
    }
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &str) -> Result<KvPair, KvError> {
        (**self).get(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, KvError> {
        (**self).list(prefix)
    }

    fn watch_tree(
        &self,
        prefix: &str,
        stop: Receiver<()>,
    ) -> Result<Receiver<Vec<KvPair>>, KvError> {
        (**self).watch_tree(prefix, stop)
    }

    fn close(&self) -> Result<(), KvError> {
        (**self).close()
    }
}

/// `key` 是否位于 `prefix` 之下（不含 `prefix` 自身），空前缀包含所有键
pub fn is_under(prefix: &str, key: &str) -> bool {
    if prefix.is_empty() {
        return !key.is_empty();
    }
    key.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

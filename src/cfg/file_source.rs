//! 文件配置源
//!
//! 从本地单个文件加载配置，文件格式由调用方传入的解析函数决定；
//! 监听文件变化，写入稳定后发出一次变更信号

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::source::{Changes, Source};
use super::unmarshal::{self, UnmarshalFn};
use crate::decode::decode_json;
use crate::errors::{ClassError, WrapErr, DECODE, TRANSPORT, UNAVAILABLE};
use crate::fs::FileWatch;
use crate::watch::Debouncer;

/// 文件配置源的配置
#[derive(Debug, Clone, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct FileSourceConfig {
    /// 配置文件路径
    pub path: String,
    /// 防抖窗口（毫秒）
    #[default = 500]
    pub debounce_ms: u64,
}

/// 文件配置源
///
/// # 示例
/// ```no_run
/// use cfg_loader::cfg::{FileSource, Source};
///
/// let source = FileSource::yaml("config/app.yaml");
/// let value: serde_json::Value = source.get().unwrap();
/// ```
pub struct FileSource {
    path: PathBuf,
    unmarshal: UnmarshalFn,
    debouncer: Debouncer,
    /// 挂载监听失败的原因，每次 load 都返回它
    error: Option<ClassError>,
}

impl FileSource {
    /// 创建文件配置源并开始监听
    ///
    /// 文件不存在或无法监听时不会失败，错误保留到 `load` 时返回
    pub fn new(config: FileSourceConfig, unmarshal: UnmarshalFn) -> Self {
        let path = PathBuf::from(&config.path);
        let window = Duration::from_millis(config.debounce_ms);

        match FileWatch::attach(&path) {
            Ok(watch) => {
                let events = watch.events();
                log::debug!("watching {:?} with debounce window {:?}", path, window);
                Self {
                    path,
                    unmarshal,
                    debouncer: Debouncer::spawn(events, window, move || watch.release()),
                    error: None,
                }
            }
            Err(e) => {
                log::warn!("file source {:?} unavailable: {:#}", path, e);
                let error = UNAVAILABLE.wrap(e, format!("watching file {:?}", path));
                Self {
                    path,
                    unmarshal,
                    debouncer: Debouncer::idle(),
                    error: Some(error),
                }
            }
        }
    }

    /// JSON 文件，防抖窗口 500ms
    pub fn json(path: impl Into<String>) -> Self {
        Self::new(
            FileSourceConfig {
                path: path.into(),
                debounce_ms: 500,
            },
            unmarshal::json(),
        )
    }

    /// YAML 文件，防抖窗口 1000ms
    pub fn yaml(path: impl Into<String>) -> Self {
        Self::new(
            FileSourceConfig {
                path: path.into(),
                debounce_ms: 1000,
            },
            unmarshal::yaml(),
        )
    }

    /// TOML 文件，防抖窗口 500ms
    pub fn toml(path: impl Into<String>) -> Self {
        Self::new(
            FileSourceConfig {
                path: path.into(),
                debounce_ms: 500,
            },
            unmarshal::toml(),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for FileSource {
    fn get<T: DeserializeOwned>(&self) -> Result<T> {
        if let Some(err) = &self.error {
            return Err(err.clone().into());
        }

        let bytes = std::fs::read(&self.path)
            .wrap_err_with(&TRANSPORT, || format!("reading file {:?}", self.path))?;
        let value = (self.unmarshal)(&bytes)
            .wrap_err_with(&DECODE, || format!("unmarshaling file {:?}", self.path))?;
        decode_json(value)
    }

    fn changes(&self) -> Changes {
        self.debouncer.changes()
    }

    fn close(&mut self) -> Result<()> {
        self.debouncer.close()
    }
}

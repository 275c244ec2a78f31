//! cfg-loader - 类型化配置加载
//!
//! 从环境变量、本地文件、层级 KV 存储加载类型化配置，并在来源变化时发出防抖后的变更信号。
//!
//! ## 模块
//!
//! - **cfg**: 配置来源（环境变量、文件、KV 存储）与统一的 [`Source`] 接口
//! - **decode**: 把配置树弱类型地解码为任意 `Deserialize` 类型
//! - **errors**: 层级化的错误类别
//! - **kv**: KV 存储客户端抽象、Consul 与内存实现、配置树构建
//! - **watch**: 防抖变更通知
//! - **fs**: 文件变更的原始事件源
//!
//! ## 示例
//!
//! ```
//! use cfg_loader::cfg::{KvSource, KvSourceConfig, Source};
//! use cfg_loader::kv::MemoryStore;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, Default)]
//! struct Server {
//!     port: u16,
//!     hosts: Vec<String>,
//! }
//!
//! let store = MemoryStore::default();
//! store.put("app/server/port", "8080");
//! store.put("app/server/hosts/0", "a.local");
//! store.put("app/server/hosts/1", "b.local");
//!
//! let mut source = KvSource::new(
//!     KvSourceConfig { prefix: "app/server".to_string(), ..Default::default() },
//!     store,
//! );
//! let mut server = Server::default();
//! source.load(&mut server).unwrap();
//! assert_eq!(server.port, 8080);
//! assert_eq!(server.hosts, vec!["a.local", "b.local"]);
//! source.close().unwrap();
//! ```

pub mod cfg;
pub mod decode;
pub mod errors;
pub mod fs;
pub mod kv;
pub mod watch;

// 重新导出主要的公共 API
pub use cfg::{
    ConsulSourceConfig, EnvSource, EnvSourceConfig, FileSource, FileSourceConfig, KvSource,
    KvSourceConfig, Source,
};
pub use decode::{decode_node, DecodeError, HumanDur};
pub use errors::{Class, ClassError, WrapErr};
pub use kv::{ConfigNode, KvError, KvPair, KvStore};
pub use watch::{Changes, Debouncer};

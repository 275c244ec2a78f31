//! cfg 模块 - 配置来源
//!
//! 从环境变量、本地文件、KV 存储加载类型化配置，并通知来源的变化

pub mod env_source;
pub mod file_source;
pub mod kv_source;
pub mod macros;
pub mod source;
pub mod unmarshal;

pub use env_source::{EnvSource, EnvSourceConfig};
pub use file_source::{FileSource, FileSourceConfig};
pub use kv_source::{ConsulSourceConfig, KvSource, KvSourceConfig};
pub use source::{Changes, Source};
pub use unmarshal::UnmarshalFn;

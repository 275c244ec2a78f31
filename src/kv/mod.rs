//! kv 模块 - 层级 KV 存储
//!
//! 提供 KV 存储客户端抽象、内置实现以及由扁平键值还原嵌套结构的树构建

pub mod store;
pub mod tree;

// 重新导出核心接口
pub use store::{ConsulStore, ConsulStoreConfig, KvError, KvPair, KvStore, MemoryStore, MemoryStoreConfig};
pub use tree::{build_tree, normalize_prefix, ConfigNode};

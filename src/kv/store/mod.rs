pub mod consul_store;
pub mod core;
pub mod memory_store;

// 重新导出核心类型和 trait
pub use core::{is_under, KvError, KvPair, KvStore};
// 重新导出具体实现
pub use consul_store::{ConsulStore, ConsulStoreConfig};
pub use memory_store::{MemoryStore, MemoryStoreConfig};

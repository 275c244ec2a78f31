//! fs 模块 - 文件系统监听
//!
//! 提供文件变更的原始事件源

pub mod watcher;

pub use watcher::FileWatch;

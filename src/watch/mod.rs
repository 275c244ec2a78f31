//! watch 模块 - 变更通知
//!
//! 文件源和 KV 源共用的防抖变更通知管道

pub mod debouncer;

pub use debouncer::{Changes, Debouncer};

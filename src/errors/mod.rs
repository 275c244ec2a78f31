//! errors 模块 - 错误分类
//!
//! 所有对外返回的错误都带有一个层级化的类别标签，调用方可以按类别做粗粒度的恢复判断，
//! 而不必匹配具体的错误值：
//!
//! ```
//! use cfg_loader::errors::{DECODE, LOADER, WrapErr};
//!
//! let res: anyhow::Result<u16> = "x".parse::<u16>().wrap_err(&DECODE, "decoding port");
//! let err = res.unwrap_err();
//! assert!(DECODE.contains(&err));
//! assert!(LOADER.contains(&err));
//! ```

mod class;

pub use class::{Class, ClassError, WrapErr};

use once_cell::sync::Lazy;

/// 本库所有错误的根类别
pub static LOADER: Lazy<Class> = Lazy::new(|| Class::new(&["loader"]));

/// 配置源不可用：连接存储或挂载文件监听失败，构造时捕获，之后每次 load 都返回
pub static UNAVAILABLE: Lazy<Class> = Lazy::new(|| LOADER.sub(&["unavailable"]));

/// 读取存储或文件时的 I/O 错误（not-found 除外）
pub static TRANSPORT: Lazy<Class> = Lazy::new(|| LOADER.sub(&["transport"]));

/// 值无法转换为目标类型
pub static DECODE: Lazy<Class> = Lazy::new(|| LOADER.sub(&["decode"]));

/// 后台监听的创建与释放
pub static WATCH: Lazy<Class> = Lazy::new(|| LOADER.sub(&["watch"]));

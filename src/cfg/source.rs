//! 配置源抽象
//!
//! 环境变量、本地文件、KV 存储等配置来源都实现 [`Source`]。
//! 调用方按需调用 `load` 获取最新配置，同时监听 `changes` 得知何时需要重新 load

use anyhow::Result;
use serde::de::DeserializeOwned;

pub use crate::watch::Changes;

/// 配置来源
///
/// # 生命周期
///
/// - 构造时启动（可选的）后台监听，`close` 时停止，之后 `changes` 返回的通道关闭
/// - 构造时无法连接的配置源不会 panic，错误在每次 `load` 时原样返回
/// - `load` 每次都重新读取来源，不缓存，可以在任意线程并发调用
///
/// # 示例
///
/// ```no_run
/// use cfg_loader::cfg::{FileSource, Source};
/// use serde::Deserialize;
///
/// #[derive(Deserialize, Default, Debug)]
/// struct DatabaseConfig {
///     host: String,
///     port: u16,
/// }
///
/// let mut source = FileSource::json("config/database.json");
/// let mut config = DatabaseConfig::default();
/// source.load(&mut config).unwrap();
///
/// for _ in source.changes() {
///     match source.get::<DatabaseConfig>() {
///         Ok(updated) => println!("配置已更新: {:?}", updated),
///         Err(e) => eprintln!("重新加载失败: {:#}", e),
///     }
/// }
/// source.close().unwrap();
/// ```
pub trait Source: Send {
    /// 读取来源并解码为 `T`
    fn get<T: DeserializeOwned>(&self) -> Result<T>;

    /// 读取来源并写入 `dest`；失败时 `dest` 保持原样
    fn load<T: DeserializeOwned>(&self, dest: &mut T) -> Result<()> {
        *dest = self.get()?;
        Ok(())
    }

    /// 变更信号流，收到信号表示来源可能已变化
    fn changes(&self) -> Changes;

    /// 停止后台监听并释放资源
    fn close(&mut self) -> Result<()>;
}

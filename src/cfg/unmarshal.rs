//! 文件格式
//!
//! 文件来源不内置格式标签，由调用方传入把字节解析为文档的函数

use anyhow::Result;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// 把文件内容解析为文档
pub type UnmarshalFn = Arc<dyn Fn(&[u8]) -> Result<JsonValue> + Send + Sync>;

pub fn json() -> UnmarshalFn {
    Arc::new(|bytes: &[u8]| -> Result<JsonValue> { Ok(serde_json::from_slice(bytes)?) })
}

pub fn yaml() -> UnmarshalFn {
    Arc::new(|bytes: &[u8]| -> Result<JsonValue> { Ok(serde_yaml::from_slice(bytes)?) })
}

pub fn toml() -> UnmarshalFn {
    Arc::new(|bytes: &[u8]| -> Result<JsonValue> {
        let text = std::str::from_utf8(bytes)?;
        Ok(toml::from_str(text)?)
    })
}

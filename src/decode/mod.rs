//! 结构化解码
//!
//! 把 [`ConfigNode`] 树解码为任意实现了 `Deserialize` 的类型。
//! 叶子值都是字符串，解码是弱类型的：数字、布尔值从字符串解析，
//! 缺失的键解码为目标类型的零值，整数键的分支解码为序列，详见 [`hooks`]。
//!
//! ```
//! use cfg_loader::decode::decode_node;
//! use cfg_loader::kv::ConfigNode;
//! use serde::Deserialize;
//! use std::collections::BTreeMap;
//!
//! #[derive(Deserialize)]
//! struct Options {
//!     port: u16,
//!     debug: bool,
//! }
//!
//! let node = ConfigNode::Branch(BTreeMap::from([
//!     ("port".to_string(), ConfigNode::Leaf("8080".to_string())),
//! ]));
//! let options: Options = decode_node(&node).unwrap();
//! assert_eq!(options.port, 8080);
//! assert!(!options.debug);
//! ```

mod deserializer;
pub mod duration;
mod error;
pub mod hooks;

pub use duration::{format_duration, parse_duration, HumanDur};
pub use error::DecodeError;

use anyhow::Result;
use serde::de::DeserializeOwned;

use crate::errors::{WrapErr, DECODE};
use crate::kv::ConfigNode;
use deserializer::NodeDeserializer;

/// 把配置树解码为 `T`，失败时返回 `DECODE` 类别的错误
///
/// 普通的 `Vec<u8>` 字段按序列解码，叶子会被当作单个 `u8` 解析；
/// 需要从 base64 字符串解码字节时，字段要标注 `serde_with::Bytes` 或使用 `serde_bytes`。
///
/// ```
/// use cfg_loader::decode::decode_node;
/// use cfg_loader::kv::ConfigNode;
/// use serde::Deserialize;
/// use serde_with::{serde_as, Bytes};
/// use std::collections::BTreeMap;
///
/// #[serde_as]
/// #[derive(Deserialize)]
/// struct Secret {
///     #[serde_as(as = "Bytes")]
///     key: Vec<u8>,
/// }
///
/// #[derive(Deserialize)]
/// struct Plain {
///     key: Vec<u8>,
/// }
///
/// let node = ConfigNode::Branch(BTreeMap::from([
///     ("key".to_string(), ConfigNode::Leaf("c2VjcmV0".to_string())),
/// ]));
/// let secret: Secret = decode_node(&node).unwrap();
/// assert_eq!(secret.key, b"secret".to_vec());
/// assert!(decode_node::<Plain>(&node).is_err());
/// ```
pub fn decode_node<T: DeserializeOwned>(node: &ConfigNode) -> Result<T> {
    T::deserialize(NodeDeserializer::new(node)).wrap_err(&DECODE, "decoding values")
}

/// 把已解析的文档解码为 `T`
///
/// 文档先转成配置树再解码，与 KV 来源共用同一套弱类型规则
pub fn decode_json<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    decode_node(&ConfigNode::from(value))
}

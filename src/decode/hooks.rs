//! 解码钩子
//!
//! 每个钩子都是纯函数，由解码器根据目标类型的形态按固定优先级选用：
//!
//! 1. 文本解码：目标类型从字符串解码（`FromStr` 类、`serde_with::DisplayFromStr`、[`HumanDur`]），
//!    叶子字符串原样交给目标类型，它返回的错误附带原始值
//! 2. 指针默认值：`Option<T>` 遇到空字符串时得到 `Some(零值)` 而不是 `None`
//! 3. 下标序列：序列类型遇到所有键都是非负整数的分支时，按下标升序排列成序列，
//!    允许下标不连续，长度等于子节点个数
//! 4. 字节序列：字节类型（`serde_bytes`、`serde_with::Bytes`）的字符串按 base64 解码
//! 5. 弱类型标量：数字、布尔值从字符串解析，空字符串为零值
//!
//! [`HumanDur`]: super::duration::HumanDur

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeMap;

use super::error::{display_path, DecodeError};
use crate::kv::ConfigNode;

/// 零值节点
pub(crate) static ABSENT: ConfigNode = ConfigNode::Absent;

/// 指针默认值：空字符串替换为零值节点
pub fn pointer_default(value: &str) -> Option<&'static ConfigNode> {
    if value.is_empty() {
        Some(&ABSENT)
    } else {
        None
    }
}

/// 下标序列：把分支按整数下标升序排列
pub fn indexed_sequence<'a>(
    children: &'a BTreeMap<String, ConfigNode>,
    path: &str,
) -> Result<Vec<(&'a str, &'a ConfigNode)>, DecodeError> {
    let mut indexed = children
        .iter()
        .map(|(key, node)| {
            key.parse::<usize>()
                .map(|index| (index, key.as_str(), node))
                .map_err(|source| DecodeError::Index {
                    path: display_path(path),
                    key: key.clone(),
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    indexed.sort_by_key(|(index, _, _)| *index);

    Ok(indexed.into_iter().map(|(_, key, node)| (key, node)).collect())
}

/// 字节序列：标准 base64 解码
pub fn base64_bytes(value: &str, path: &str) -> Result<Vec<u8>, DecodeError> {
    STANDARD
        .decode(value.as_bytes())
        .map_err(|source| DecodeError::Base64 {
            path: display_path(path),
            value: value.to_string(),
            source,
        })
}

/// 弱类型布尔值：`1 t T TRUE true True` 与 `0 f F FALSE false False`，空字符串为 false
pub fn weak_bool(value: &str) -> Option<bool> {
    match value {
        "" | "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        _ => None,
    }
}

/// 弱类型有符号整数，支持 `0x`/`0o`/`0b` 前缀，空字符串为 0
pub fn weak_i64(value: &str) -> Option<i64> {
    if value.is_empty() {
        return Some(0);
    }
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let magnitude = parse_radix(digits)? as i128;
    let signed = if negative { -magnitude } else { magnitude };
    i64::try_from(signed).ok()
}

/// 弱类型无符号整数，支持 `0x`/`0o`/`0b` 前缀，空字符串为 0
pub fn weak_u64(value: &str) -> Option<u64> {
    if value.is_empty() {
        return Some(0);
    }
    parse_radix(value.strip_prefix('+').unwrap_or(value))
}

/// 弱类型浮点数，空字符串为 0
pub fn weak_f64(value: &str) -> Option<f64> {
    if value.is_empty() {
        return Some(0.0);
    }
    value.parse().ok()
}

fn parse_radix(digits: &str) -> Option<u64> {
    let (radix, body) = if let Some(rest) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, rest)
    } else if let Some(rest) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        (8, rest)
    } else if let Some(rest) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        (2, rest)
    } else {
        (10, digits)
    };
    if body.is_empty() || body.starts_with(['+', '-']) {
        return None;
    }
    u64::from_str_radix(body, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(keys: &[&str]) -> BTreeMap<String, ConfigNode> {
        keys.iter()
            .map(|k| (k.to_string(), ConfigNode::Leaf(format!("v{}", k))))
            .collect()
    }

    #[test]
    fn test_indexed_sequence_sorts_numerically() {
        let children = branch(&["10", "2", "1"]);
        let items = indexed_sequence(&children, "e").unwrap();
        let keys: Vec<&str> = items.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_indexed_sequence_tolerates_gaps() {
        let children = branch(&["7", "3"]);
        let items = indexed_sequence(&children, "e").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].1, &ConfigNode::Leaf("v3".to_string()));
    }

    #[test]
    fn test_indexed_sequence_rejects_non_numeric() {
        let children = branch(&["1", "x"]);
        let err = indexed_sequence(&children, "a/e").unwrap_err();
        assert!(matches!(err, DecodeError::Index { ref key, .. } if key == "x"));
        assert!(err.to_string().starts_with("a/e: converting index \"x\""));

        let negative = branch(&["-1"]);
        assert!(indexed_sequence(&negative, "e").is_err());
    }

    #[test]
    fn test_base64_bytes() {
        assert_eq!(base64_bytes("aGVsbG8=", "k").unwrap(), b"hello".to_vec());
        assert!(matches!(
            base64_bytes("not base64!", "k"),
            Err(DecodeError::Base64 { .. })
        ));
    }

    #[test]
    fn test_pointer_default() {
        assert_eq!(pointer_default(""), Some(&ConfigNode::Absent));
        assert_eq!(pointer_default("x"), None);
    }

    #[test]
    fn test_weak_scalars() {
        assert_eq!(weak_bool("True"), Some(true));
        assert_eq!(weak_bool("0"), Some(false));
        assert_eq!(weak_bool(""), Some(false));
        assert_eq!(weak_bool("yes"), None);

        assert_eq!(weak_i64("42"), Some(42));
        assert_eq!(weak_i64("-42"), Some(-42));
        assert_eq!(weak_i64("0x1f"), Some(31));
        assert_eq!(weak_i64("-0b101"), Some(-5));
        assert_eq!(weak_i64(""), Some(0));
        assert_eq!(weak_i64("--1"), None);
        assert_eq!(weak_i64("1.5"), None);
        assert_eq!(weak_i64("-9223372036854775808"), Some(i64::MIN));

        assert_eq!(weak_u64("0o17"), Some(15));
        assert_eq!(weak_u64("-1"), None);

        assert_eq!(weak_f64("0.1"), Some(0.1));
        assert_eq!(weak_f64(""), Some(0.0));
        assert_eq!(weak_f64("abc"), None);
    }
}

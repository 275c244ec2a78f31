use serde::de;
use std::fmt::Display;
use std::num::ParseIntError;
use thiserror::Error;

/// 结构化解码错误，携带出错的键路径和原始值
#[derive(Error, Debug)]
pub enum DecodeError {
    /// 目标类型自身报告的错误，尚未附加位置信息
    #[error("{0}")]
    Message(String),

    #[error("{path}: cannot decode {value:?}: {reason}")]
    InvalidValue {
        path: String,
        value: String,
        reason: String,
    },

    #[error("{path}: {found} cannot be decoded as {expected}")]
    InvalidShape {
        path: String,
        found: &'static str,
        expected: &'static str,
    },

    #[error("{path}: converting index {key:?}")]
    Index {
        path: String,
        key: String,
        #[source]
        source: ParseIntError,
    },

    #[error("{path}: decoding base64 {value:?}")]
    Base64 {
        path: String,
        value: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("{path}: {reason}")]
    At { path: String, reason: String },
}

impl de::Error for DecodeError {
    fn custom<T: Display>(msg: T) -> Self {
        DecodeError::Message(msg.to_string())
    }
}

impl DecodeError {
    /// 为叶子值上的错误补上路径和原始值
    pub(crate) fn at_value(self, path: &str, value: &str) -> Self {
        match self {
            DecodeError::Message(reason) => DecodeError::InvalidValue {
                path: display_path(path),
                value: value.to_string(),
                reason,
            },
            other => other,
        }
    }

    /// 为分支上的错误（缺字段、未知枚举值等）补上路径
    pub(crate) fn at_path(self, path: &str) -> Self {
        match self {
            DecodeError::Message(reason) => DecodeError::At {
                path: display_path(path),
                reason,
            },
            other => other,
        }
    }
}

pub(crate) fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

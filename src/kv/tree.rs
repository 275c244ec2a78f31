//! 层级树构建
//!
//! 递归遍历 KV 存储中某个前缀下的命名空间，按 `/` 分隔的路径还原出嵌套结构

use anyhow::Result;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use super::store::{KvError, KvStore};
use crate::errors::TRANSPORT;

/// 由 KV 存储还原出的配置树
///
/// 每次 load 重新构建，不跨调用缓存
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigNode {
    /// 键或前缀不存在
    #[default]
    Absent,
    /// 叶子节点的字符串值
    Leaf(String),
    /// 子路径段到子节点的映射
    Branch(BTreeMap<String, ConfigNode>),
}

impl ConfigNode {
    pub fn is_absent(&self) -> bool {
        matches!(self, ConfigNode::Absent)
    }

    /// 按 `/` 分隔的相对路径查找子节点
    pub fn get(&self, path: &str) -> Option<&ConfigNode> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, segment| match node {
                ConfigNode::Branch(children) => children.get(segment),
                _ => None,
            })
    }

    /// 由 `(路径, 值)` 构建分支，路径按 `separator` 切分，中间层按需创建
    pub fn from_paths<I, K, V>(pairs: I, separator: char) -> ConfigNode
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut children = BTreeMap::new();
        for (path, value) in pairs {
            let segments: Vec<&str> = path
                .as_ref()
                .split(separator)
                .filter(|s| !s.is_empty())
                .collect();
            put(&mut children, &segments, ConfigNode::Leaf(value.into()));
        }
        ConfigNode::Branch(children)
    }

    /// 合并另一个节点：两个分支逐键合并，Absent 不覆盖已有值，其余情况以新值为准
    fn merge(&mut self, other: ConfigNode) {
        match (self, other) {
            (_, ConfigNode::Absent) => {}
            (ConfigNode::Branch(mine), ConfigNode::Branch(theirs)) => {
                for (key, node) in theirs {
                    put(mine, &[key.as_str()], node);
                }
            }
            (slot, other) => *slot = other,
        }
    }
}

/// 已解析的文档转成配置树：标量转为叶子字符串，数组按下标转为分支，`null` 为 `Absent`
impl From<JsonValue> for ConfigNode {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => ConfigNode::Absent,
            JsonValue::Bool(b) => ConfigNode::Leaf(b.to_string()),
            JsonValue::Number(n) => ConfigNode::Leaf(n.to_string()),
            JsonValue::String(s) => ConfigNode::Leaf(s),
            JsonValue::Array(items) => ConfigNode::Branch(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| (i.to_string(), ConfigNode::from(item)))
                    .collect(),
            ),
            JsonValue::Object(fields) => ConfigNode::Branch(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, ConfigNode::from(v)))
                    .collect(),
            ),
        }
    }
}

/// 去掉前缀首尾的 `/`
pub fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_matches('/').to_string()
}

/// 构建 `prefix` 之下的配置树
///
/// 1. `list(prefix)` 返回 not-found 时结果为 `Absent`
/// 2. 列表为空时视为叶子，`get(prefix)` 的值作为 `Leaf`，not-found 时为 `Absent`
/// 3. 列表非空时为 `Branch`，逐个子键递归构建，按去掉父前缀后的相对路径插入，中间层按需创建
///
/// not-found 之外的任何错误都会中止整棵树的构建，不会返回半成品
pub fn build_tree<S>(store: &S, prefix: &str) -> Result<ConfigNode>
where
    S: KvStore + ?Sized,
{
    let pairs = match store.list(prefix) {
        Ok(pairs) => pairs,
        Err(KvError::KeyNotFound) => return Ok(ConfigNode::Absent),
        Err(e) => {
            return Err(TRANSPORT
                .wrap(e, format!("getting KV list for {:?}", prefix))
                .into())
        }
    };

    if pairs.is_empty() {
        return match store.get(prefix) {
            Ok(pair) => Ok(pair
                .value
                .map(|v| ConfigNode::Leaf(String::from_utf8_lossy(&v).into_owned()))
                .unwrap_or_default()),
            Err(KvError::KeyNotFound) => Ok(ConfigNode::Absent),
            Err(e) => Err(TRANSPORT
                .wrap(e, format!("getting key value for {:?}", prefix))
                .into()),
        };
    }

    let mut children = BTreeMap::new();
    for pair in pairs {
        // 目录键（如 Consul 的 `app/hosts/`）带结尾 `/`，按去掉后的路径递归
        let key = pair.key.trim_end_matches('/');
        let segments = relative_segments(prefix, key);
        if segments.is_empty() {
            continue;
        }
        let child = build_tree(store, key)?;
        put(&mut children, &segments, child);
    }
    log::debug!("built branch {:?} with {} children", prefix, children.len());

    Ok(ConfigNode::Branch(children))
}

/// 子键相对父前缀的路径段；不以父前缀开头的键保留完整路径
///
/// 前缀和键首尾的 `/` 不参与比较
fn relative_segments<'a>(prefix: &str, key: &'a str) -> Vec<&'a str> {
    let prefix = prefix.trim_matches('/');
    let key = key.trim_matches('/');
    let rel = match key.strip_prefix(prefix) {
        Some(rest) if prefix.is_empty() => rest,
        Some("") => return Vec::new(),
        Some(rest) if rest.starts_with('/') => &rest[1..],
        _ => key,
    };
    rel.split('/').filter(|s| !s.is_empty()).collect()
}

fn put(dest: &mut BTreeMap<String, ConfigNode>, path: &[&str], node: ConfigNode) {
    match path {
        [] => {}
        [last] => match dest.get_mut(*last) {
            Some(existing) => existing.merge(node),
            None => {
                dest.insert(last.to_string(), node);
            }
        },
        [first, rest @ ..] => {
            let entry = dest
                .entry(first.to_string())
                .or_insert_with(|| ConfigNode::Branch(BTreeMap::new()));
            if !matches!(entry, ConfigNode::Branch(_)) {
                *entry = ConfigNode::Branch(BTreeMap::new());
            }
            if let ConfigNode::Branch(children) = entry {
                put(children, rest, node);
            }
        }
    }
}

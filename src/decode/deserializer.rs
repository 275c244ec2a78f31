use serde::de::value::BorrowedStrDeserializer;
use serde::de::{
    self, DeserializeSeed, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor,
};
use serde::forward_to_deserialize_any;
use std::collections::{BTreeMap, HashSet};

use super::error::{display_path, DecodeError};
use super::hooks::{self, ABSENT};
use crate::kv::ConfigNode;

type Result<T> = std::result::Result<T, DecodeError>;

/// 配置树上的弱类型 serde 反序列化器
///
/// 叶子值总是字符串，按目标类型的形态选择解码钩子；`Absent` 对任何目标都得到零值
pub(crate) struct NodeDeserializer<'de> {
    node: &'de ConfigNode,
    path: String,
}

impl<'de> NodeDeserializer<'de> {
    pub(crate) fn new(node: &'de ConfigNode) -> Self {
        Self {
            node,
            path: String::new(),
        }
    }

    fn kind(&self) -> &'static str {
        match self.node {
            ConfigNode::Absent => "absent value",
            ConfigNode::Leaf(_) => "leaf value",
            ConfigNode::Branch(_) => "branch",
        }
    }

    fn shape_error(&self, expected: &'static str) -> DecodeError {
        DecodeError::InvalidShape {
            path: display_path(&self.path),
            found: self.kind(),
            expected,
        }
    }

    fn invalid(&self, value: &str, reason: &str) -> DecodeError {
        DecodeError::InvalidValue {
            path: display_path(&self.path),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn map_access(&self, children: &'de BTreeMap<String, ConfigNode>) -> NodeMap<'de> {
        NodeMap::new(
            &self.path,
            children.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        )
    }

    /// 结构体字段按声明名匹配，精确匹配优先，其次忽略大小写；缺失的字段以 `Absent` 补齐
    fn struct_access(
        &self,
        children: Option<&'de BTreeMap<String, ConfigNode>>,
        fields: &'static [&'static str],
    ) -> NodeMap<'de> {
        let mut entries = Vec::with_capacity(fields.len());
        let mut used = HashSet::new();

        for field in fields {
            let found = children.and_then(|children| {
                children.get_key_value(*field).or_else(|| {
                    children
                        .iter()
                        .find(|(k, _)| !used.contains(k.as_str()) && k.eq_ignore_ascii_case(field))
                })
            });
            match found {
                Some((key, node)) => {
                    used.insert(key.as_str());
                    entries.push((*field, child_path(&self.path, key), node));
                }
                None => entries.push((*field, child_path(&self.path, field), &ABSENT)),
            }
        }

        for (key, node) in children.into_iter().flatten() {
            if !used.contains(key.as_str()) {
                entries.push((key.as_str(), child_path(&self.path, key), node));
            }
        }

        NodeMap {
            entries: entries.into_iter(),
            pending: None,
        }
    }
}

fn child_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", parent, segment)
    }
}

macro_rules! deserialize_signed {
    ($($method:ident),*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
            match self.node {
                ConfigNode::Absent => visitor.visit_i64(0),
                ConfigNode::Leaf(s) => match hooks::weak_i64(s) {
                    Some(n) => visitor.visit_i64(n).map_err(|e: DecodeError| e.at_value(&self.path, s)),
                    None => Err(self.invalid(s, "invalid integer")),
                },
                ConfigNode::Branch(_) => Err(self.shape_error("an integer")),
            }
        }
    )*};
}

macro_rules! deserialize_unsigned {
    ($($method:ident),*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
            match self.node {
                ConfigNode::Absent => visitor.visit_u64(0),
                ConfigNode::Leaf(s) => match hooks::weak_u64(s) {
                    Some(n) => visitor.visit_u64(n).map_err(|e: DecodeError| e.at_value(&self.path, s)),
                    None => Err(self.invalid(s, "invalid unsigned integer")),
                },
                ConfigNode::Branch(_) => Err(self.shape_error("an unsigned integer")),
            }
        }
    )*};
}

macro_rules! deserialize_float {
    ($($method:ident),*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
            match self.node {
                ConfigNode::Absent => visitor.visit_f64(0.0),
                ConfigNode::Leaf(s) => match hooks::weak_f64(s) {
                    Some(n) => visitor.visit_f64(n).map_err(|e: DecodeError| e.at_value(&self.path, s)),
                    None => Err(self.invalid(s, "invalid float")),
                },
                ConfigNode::Branch(_) => Err(self.shape_error("a float")),
            }
        }
    )*};
}

impl<'de> de::Deserializer<'de> for NodeDeserializer<'de> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.node {
            ConfigNode::Absent => visitor.visit_unit(),
            ConfigNode::Leaf(s) => visitor
                .visit_borrowed_str(s)
                .map_err(|e: DecodeError| e.at_value(&self.path, s)),
            ConfigNode::Branch(children) => visitor
                .visit_map(self.map_access(children))
                .map_err(|e| e.at_path(&self.path)),
        }
    }

    deserialize_signed!(deserialize_i8, deserialize_i16, deserialize_i32, deserialize_i64);
    deserialize_unsigned!(deserialize_u8, deserialize_u16, deserialize_u32, deserialize_u64);
    deserialize_float!(deserialize_f32, deserialize_f64);

    fn deserialize_i128<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_i64(visitor)
    }

    fn deserialize_u128<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_u64(visitor)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.node {
            ConfigNode::Absent => visitor.visit_bool(false),
            ConfigNode::Leaf(s) => match hooks::weak_bool(s) {
                Some(b) => visitor.visit_bool(b),
                None => Err(self.invalid(s, "invalid boolean")),
            },
            ConfigNode::Branch(_) => Err(self.shape_error("a boolean")),
        }
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.node {
            ConfigNode::Absent => visitor.visit_char('\0'),
            ConfigNode::Leaf(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => visitor.visit_char(c),
                    _ => Err(self.invalid(s, "expected a single character")),
                }
            }
            ConfigNode::Branch(_) => Err(self.shape_error("a character")),
        }
    }

    /// 文本解码：字符串原样交给目标类型
    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.node {
            ConfigNode::Absent => visitor.visit_borrowed_str(""),
            ConfigNode::Leaf(s) => visitor
                .visit_borrowed_str(s)
                .map_err(|e: DecodeError| e.at_value(&self.path, s)),
            ConfigNode::Branch(_) => Err(self.shape_error("a string")),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_byte_buf(visitor)
    }

    /// 字节序列：字符串按 base64 解码
    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.node {
            ConfigNode::Absent => visitor.visit_byte_buf(Vec::new()),
            ConfigNode::Leaf(s) => {
                let bytes = hooks::base64_bytes(s, &self.path)?;
                visitor.visit_byte_buf(bytes).map_err(|e: DecodeError| e.at_value(&self.path, s))
            }
            ConfigNode::Branch(_) => Err(self.shape_error("base64 bytes")),
        }
    }

    /// 指针默认值：空字符串得到 `Some(零值)`
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let node = self.node;
        match node {
            ConfigNode::Absent => visitor.visit_none(),
            ConfigNode::Leaf(s) => match hooks::pointer_default(s) {
                Some(zero) => visitor.visit_some(NodeDeserializer {
                    node: zero,
                    path: self.path,
                }),
                None => visitor.visit_some(self),
            },
            ConfigNode::Branch(_) => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    /// 下标序列；非空的叶子提升为单元素序列
    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let items = match self.node {
            ConfigNode::Absent => Vec::new(),
            ConfigNode::Leaf(s) if s.is_empty() => Vec::new(),
            ConfigNode::Leaf(_) => vec![(self.path.clone(), self.node)],
            ConfigNode::Branch(children) => hooks::indexed_sequence(children, &self.path)?
                .into_iter()
                .map(|(key, node)| (child_path(&self.path, key), node))
                .collect(),
        };

        visitor
            .visit_seq(NodeSeq {
                items: items.into_iter(),
            })
            .map_err(|e| e.at_path(&self.path))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let access = match self.node {
            ConfigNode::Absent => NodeMap::new(&self.path, Vec::new()),
            ConfigNode::Leaf(s) if s.is_empty() => NodeMap::new(&self.path, Vec::new()),
            ConfigNode::Leaf(_) => return Err(self.shape_error("a map")),
            ConfigNode::Branch(children) => self.map_access(children),
        };
        visitor.visit_map(access).map_err(|e| e.at_path(&self.path))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let access = match self.node {
            ConfigNode::Absent => self.struct_access(None, fields),
            ConfigNode::Leaf(s) if s.is_empty() => self.struct_access(None, fields),
            ConfigNode::Leaf(_) => return Err(self.shape_error("a struct")),
            ConfigNode::Branch(children) => self.struct_access(Some(children), fields),
        };
        visitor.visit_map(access).map_err(|e| e.at_path(&self.path))
    }

    /// 叶子为单元变体名，单键分支为带数据的变体
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.node {
            ConfigNode::Leaf(s) => visitor
                .visit_enum(BorrowedStrDeserializer::<DecodeError>::new(s))
                .map_err(|e: DecodeError| e.at_value(&self.path, s)),
            ConfigNode::Branch(children) if children.len() == 1 => {
                let (variant, node) = children
                    .iter()
                    .next()
                    .ok_or_else(|| self.shape_error("an enum"))?;
                let path = self.path.clone();
                visitor
                    .visit_enum(NodeEnum {
                        variant,
                        node,
                        path: child_path(&self.path, variant),
                    })
                    .map_err(|e| e.at_path(&path))
            }
            _ => Err(self.shape_error("an enum")),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

struct NodeSeq<'de> {
    items: std::vec::IntoIter<(String, &'de ConfigNode)>,
}

impl<'de> SeqAccess<'de> for NodeSeq<'de> {
    type Error = DecodeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        match self.items.next() {
            Some((path, node)) => seed.deserialize(NodeDeserializer { node, path }).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct NodeMap<'de> {
    entries: std::vec::IntoIter<(&'de str, String, &'de ConfigNode)>,
    pending: Option<(String, &'de ConfigNode)>,
}

impl<'de> NodeMap<'de> {
    fn new(parent: &str, entries: Vec<(&'de str, &'de ConfigNode)>) -> Self {
        let entries: Vec<_> = entries
            .into_iter()
            .map(|(key, node)| (key, child_path(parent, key), node))
            .collect();
        Self {
            entries: entries.into_iter(),
            pending: None,
        }
    }
}

impl<'de> MapAccess<'de> for NodeMap<'de> {
    type Error = DecodeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.entries.next() {
            Some((key, path, node)) => {
                let value = seed.deserialize(KeyDeserializer { key, path: &path })?;
                self.pending = Some((path, node));
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        match self.pending.take() {
            Some((path, node)) => seed.deserialize(NodeDeserializer { node, path }),
            None => Err(de::Error::custom("value requested before key")),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

/// 映射键只有字符串形态，数值类型的键同样按弱类型解析
struct KeyDeserializer<'de, 'p> {
    key: &'de str,
    path: &'p str,
}

impl<'de, 'p> KeyDeserializer<'de, 'p> {
    fn invalid(&self, reason: &str) -> DecodeError {
        DecodeError::InvalidValue {
            path: display_path(self.path),
            value: self.key.to_string(),
            reason: reason.to_string(),
        }
    }
}

macro_rules! deserialize_key {
    ($($method:ident => $parse:ident, $visit:ident, $reason:literal);* $(;)?) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
            match hooks::$parse(self.key) {
                Some(n) => visitor.$visit(n).map_err(|e: DecodeError| e.at_value(self.path, self.key)),
                None => Err(self.invalid($reason)),
            }
        }
    )*};
}

impl<'de, 'p> de::Deserializer<'de> for KeyDeserializer<'de, 'p> {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor
            .visit_borrowed_str(self.key)
            .map_err(|e: DecodeError| e.at_value(self.path, self.key))
    }

    deserialize_key! {
        deserialize_i8 => weak_i64, visit_i64, "invalid integer key";
        deserialize_i16 => weak_i64, visit_i64, "invalid integer key";
        deserialize_i32 => weak_i64, visit_i64, "invalid integer key";
        deserialize_i64 => weak_i64, visit_i64, "invalid integer key";
        deserialize_u8 => weak_u64, visit_u64, "invalid unsigned integer key";
        deserialize_u16 => weak_u64, visit_u64, "invalid unsigned integer key";
        deserialize_u32 => weak_u64, visit_u64, "invalid unsigned integer key";
        deserialize_u64 => weak_u64, visit_u64, "invalid unsigned integer key";
        deserialize_f32 => weak_f64, visit_f64, "invalid float key";
        deserialize_f64 => weak_f64, visit_f64, "invalid float key";
        deserialize_bool => weak_bool, visit_bool, "invalid boolean key";
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor
            .visit_enum(BorrowedStrDeserializer::<DecodeError>::new(self.key))
            .map_err(|e| e.at_value(self.path, self.key))
    }

    forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf option unit unit_struct seq tuple
        tuple_struct map struct identifier ignored_any
    }
}

struct NodeEnum<'de> {
    variant: &'de str,
    node: &'de ConfigNode,
    path: String,
}

impl<'de> EnumAccess<'de> for NodeEnum<'de> {
    type Error = DecodeError;
    type Variant = NodeDeserializer<'de>;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant)> {
        let value = seed.deserialize(BorrowedStrDeserializer::<DecodeError>::new(self.variant))?;
        Ok((
            value,
            NodeDeserializer {
                node: self.node,
                path: self.path,
            },
        ))
    }
}

impl<'de> VariantAccess<'de> for NodeDeserializer<'de> {
    type Error = DecodeError;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_seq(self, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(self, fields: &'static [&'static str], visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_struct(self, "", fields, visitor)
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data_type::DataType;
use crate::key::Key;
use crate::key_array::KeyArray;
use crate::timestamp::Timestamp;

/// The contents of one cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Timestamp(Timestamp),
    Link(Key),
    LinkList(KeyArray),
    BackLinks(KeyArray),
}

impl Value {
    /// The value a fresh object carries in a column of type `ty`.
    pub fn default_for(ty: DataType, nullable: bool) -> Value {
        if nullable {
            return Value::Null;
        }
        match ty {
            DataType::Int => Value::Int(0),
            DataType::Bool => Value::Bool(false),
            DataType::Float => Value::Float(0.0),
            DataType::Double => Value::Double(0.0),
            DataType::String => Value::String(String::new()),
            DataType::Binary => Value::Binary(Vec::new()),
            DataType::Timestamp => Value::Timestamp(Timestamp::epoch()),
            DataType::Link => Value::Null,
            DataType::LinkList => Value::LinkList(KeyArray::new()),
            DataType::BackLink => Value::BackLinks(KeyArray::new()),
        }
    }

    /// The data type carried by this value, or `None` for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(DataType::Int),
            Value::Bool(_) => Some(DataType::Bool),
            Value::Float(_) => Some(DataType::Float),
            Value::Double(_) => Some(DataType::Double),
            Value::String(_) => Some(DataType::String),
            Value::Binary(_) => Some(DataType::Binary),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Link(_) => Some(DataType::Link),
            Value::LinkList(_) => Some(DataType::LinkList),
            Value::BackLinks(_) => Some(DataType::BackLink),
        }
    }

    /// Returns `true` for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The single link target, if this is a non-null link.
    pub fn as_link(&self) -> Option<Key> {
        match self {
            Value::Link(k) => Some(*k),
            _ => None,
        }
    }

    /// The key array behind a link list or backlink cell.
    pub fn as_keys(&self) -> Option<&KeyArray> {
        match self {
            Value::LinkList(keys) | Value::BackLinks(keys) => Some(keys),
            _ => None,
        }
    }

    pub fn as_keys_mut(&mut self) -> Option<&mut KeyArray> {
        match self {
            Value::LinkList(keys) | Value::BackLinks(keys) => Some(keys),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Timestamp(ts) => write!(f, "{ts}"),
            Value::Link(k) => write!(f, "->{k}"),
            Value::LinkList(keys) => write!(f, "->{keys:?}"),
            Value::BackLinks(keys) => write!(f, "<-{keys:?}"),
        }
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The type of values stored in a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Bool,
    Float,
    Double,
    String,
    Binary,
    Timestamp,
    /// A single, nullable reference to an object in a target table.
    Link,
    /// An ordered list of references to objects in a target table.
    LinkList,
    /// The reverse index of a link column. Never created directly.
    BackLink,
}

impl DataType {
    /// True for `Link` and `LinkList`.
    pub fn is_link(self) -> bool {
        matches!(self, DataType::Link | DataType::LinkList)
    }

    /// Whether a search index may be attached to columns of this type.
    pub fn is_indexable(self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Bool | DataType::String | DataType::Timestamp
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Binary => "binary",
            Self::Timestamp => "timestamp",
            Self::Link => "link",
            Self::LinkList => "linklist",
            Self::BackLink => "backlink",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DataType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" => Ok(Self::Int),
            "bool" => Ok(Self::Bool),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "string" => Ok(Self::String),
            "binary" => Ok(Self::Binary),
            "timestamp" => Ok(Self::Timestamp),
            "link" => Ok(Self::Link),
            "linklist" => Ok(Self::LinkList),
            other => Err(TypeError::UnknownDataType(other.to_string())),
        }
    }
}

/// Ownership semantics of a link column.
///
/// A strong link implies that the origin object owns the target. When the
/// last strong link to a target is broken, the target is cascade-removed.
/// Breaking a weak link never removes anything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    #[default]
    Weak,
    Strong,
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weak => write!(f, "weak"),
            Self::Strong => write!(f, "strong"),
        }
    }
}

impl FromStr for LinkType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weak" => Ok(Self::Weak),
            "strong" => Ok(Self::Strong),
            other => Err(TypeError::UnknownLinkType(other.to_string())),
        }
    }
}

//! Column descriptors.

use serde::{Deserialize, Serialize};

use keel_types::{DataType, LinkType, TableKey, Value};

/// Where a link column points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    /// The table holding the link targets.
    pub target: TableKey,
    /// Index of the reciprocal backlink column inside `target`.
    pub backlink_ndx: usize,
    /// Ownership semantics.
    pub link_type: LinkType,
}

/// Which link column a backlink column mirrors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklinkInfo {
    /// The table holding the link column.
    pub origin: TableKey,
    /// Index of the link column inside `origin`.
    pub origin_ndx: usize,
}

/// Descriptor of one column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub indexed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlink: Option<BacklinkInfo>,
}

impl ColumnSpec {
    /// A plain value column.
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            indexed: false,
            link: None,
            backlink: None,
        }
    }

    /// A link or link-list column. `backlink_ndx` is filled in once the
    /// reciprocal column exists in the target.
    pub fn link(
        name: impl Into<String>,
        data_type: DataType,
        target: TableKey,
        link_type: LinkType,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: data_type == DataType::Link,
            indexed: false,
            link: Some(LinkInfo {
                target,
                backlink_ndx: 0,
                link_type,
            }),
            backlink: None,
        }
    }

    /// The hidden backlink column mirroring `origin_ndx` in `origin`.
    pub fn backlink(origin: TableKey, origin_ndx: usize) -> Self {
        Self {
            name: format!("!backlink_{origin}_{origin_ndx}"),
            data_type: DataType::BackLink,
            nullable: false,
            indexed: false,
            link: None,
            backlink: Some(BacklinkInfo { origin, origin_ndx }),
        }
    }

    /// Whether this column holds strong links.
    pub fn is_strong(&self) -> bool {
        matches!(
            self.link,
            Some(LinkInfo {
                link_type: LinkType::Strong,
                ..
            })
        )
    }

    /// The value a freshly created object carries in this column.
    pub fn default_value(&self) -> Value {
        Value::default_for(self.data_type, self.nullable)
    }
}

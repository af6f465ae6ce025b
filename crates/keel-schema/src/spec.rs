//! The mutable column layout owned by each table.
//!
//! [`Spec`] keeps public columns in front of backlink columns. Inserting or
//! erasing a public column therefore shifts every backlink column; callers
//! that own other tables must mirror the shift with
//! [`Spec::shift_link_targets`] and [`Spec::shift_backlink_origins`].

use serde::{Deserialize, Serialize};
use tracing::trace;

use keel_types::{DataType, LinkType, TableKey};

use crate::column::ColumnSpec;
use crate::error::{Result, SchemaError};
use crate::names::{validate_column_name, DEFAULT_MAX_NAME_LENGTH};
use crate::traits::SchemaDescriptor;

/// Ordered column descriptors for one table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    columns: Vec<ColumnSpec>,
    public_count: usize,
    primary_key: Option<usize>,
    max_name_len: usize,
}

impl Default for Spec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NAME_LENGTH)
    }
}

impl Spec {
    /// Create an empty layout whose column names may be at most
    /// `max_name_len` bytes.
    pub fn new(max_name_len: usize) -> Self {
        Self {
            columns: Vec::new(),
            public_count: 0,
            primary_key: None,
            max_name_len,
        }
    }

    /// All column descriptors, public first.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    fn check_public(&self, ndx: usize) -> Result<()> {
        if ndx >= self.public_count {
            return Err(SchemaError::IndexOutOfRange {
                ndx,
                limit: self.public_count,
            });
        }
        Ok(())
    }

    fn check_unique(&self, name: &str, skip: Option<usize>) -> Result<()> {
        let clash = self.columns[..self.public_count]
            .iter()
            .enumerate()
            .any(|(i, c)| Some(i) != skip && c.name == name);
        if clash {
            return Err(SchemaError::DuplicateColumn {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Public columns
    // -----------------------------------------------------------------------

    /// Insert a public column at `ndx`, shifting later columns right.
    ///
    /// `ndx` may equal the public column count, which appends.
    pub fn insert_column(&mut self, ndx: usize, column: ColumnSpec) -> Result<()> {
        if ndx > self.public_count {
            return Err(SchemaError::IndexOutOfRange {
                ndx,
                limit: self.public_count,
            });
        }
        validate_column_name(&column.name, self.max_name_len)?;
        self.check_unique(&column.name, None)?;
        if column.data_type == DataType::BackLink {
            return Err(SchemaError::InvalidName {
                name: column.name,
                reason: "backlink columns cannot be inserted directly".into(),
            });
        }
        if column.indexed && !column.data_type.is_indexable() {
            return Err(SchemaError::NotIndexable { ndx });
        }

        trace!(ndx, name = %column.name, ty = %column.data_type, "insert column");
        self.columns.insert(ndx, column);
        self.public_count += 1;
        if let Some(pk) = self.primary_key.as_mut() {
            if *pk >= ndx {
                *pk += 1;
            }
        }
        Ok(())
    }

    /// Remove the public column at `ndx` and return its descriptor.
    ///
    /// Removing the primary key column clears the primary key.
    pub fn erase_column(&mut self, ndx: usize) -> Result<ColumnSpec> {
        self.check_public(ndx)?;
        let column = self.columns.remove(ndx);
        self.public_count -= 1;
        self.primary_key = match self.primary_key {
            Some(pk) if pk == ndx => None,
            Some(pk) if pk > ndx => Some(pk - 1),
            other => other,
        };
        trace!(ndx, name = %column.name, "erase column");
        Ok(column)
    }

    /// Rename the public column at `ndx`.
    pub fn rename_column(&mut self, ndx: usize, name: &str) -> Result<()> {
        self.check_public(ndx)?;
        validate_column_name(name, self.max_name_len)?;
        self.check_unique(name, Some(ndx))?;
        self.columns[ndx].name = name.to_string();
        Ok(())
    }

    /// Attach or remove the search index of column `ndx`.
    pub fn set_search_index(&mut self, ndx: usize, indexed: bool) -> Result<()> {
        self.check_public(ndx)?;
        if indexed && !self.columns[ndx].data_type.is_indexable() {
            return Err(SchemaError::NotIndexable { ndx });
        }
        if !indexed && self.primary_key == Some(ndx) {
            return Err(SchemaError::PrimaryKeyIndex { ndx });
        }
        self.columns[ndx].indexed = indexed;
        Ok(())
    }

    /// Make column `ndx` the primary key, or clear it with `None`.
    ///
    /// The primary key column always carries a search index.
    pub fn set_primary_key(&mut self, ndx: Option<usize>) -> Result<()> {
        if let Some(ndx) = ndx {
            self.check_public(ndx)?;
            if !self.columns[ndx].data_type.is_indexable() {
                return Err(SchemaError::NotIndexable { ndx });
            }
            self.columns[ndx].indexed = true;
        }
        self.primary_key = ndx;
        Ok(())
    }

    /// Change the link strength of link column `ndx`, returning the old one.
    pub fn set_link_type(&mut self, ndx: usize, link_type: LinkType) -> Result<LinkType> {
        self.check_public(ndx)?;
        let link = self.columns[ndx]
            .link
            .as_mut()
            .ok_or(SchemaError::NotALinkColumn { ndx })?;
        Ok(std::mem::replace(&mut link.link_type, link_type))
    }

    /// Record where the reciprocal backlink of link column `ndx` lives.
    pub fn set_backlink_ndx(&mut self, ndx: usize, backlink_ndx: usize) -> Result<()> {
        self.check_public(ndx)?;
        let link = self.columns[ndx]
            .link
            .as_mut()
            .ok_or(SchemaError::NotALinkColumn { ndx })?;
        link.backlink_ndx = backlink_ndx;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Backlink columns
    // -----------------------------------------------------------------------

    /// Append a backlink column mirroring `origin_ndx` in `origin` and return
    /// its index.
    pub fn add_backlink_column(&mut self, origin: TableKey, origin_ndx: usize) -> usize {
        let ndx = self.columns.len();
        trace!(ndx, %origin, origin_ndx, "add backlink column");
        self.columns.push(ColumnSpec::backlink(origin, origin_ndx));
        ndx
    }

    /// Insert a backlink column at `ndx`, which must lie in the backlink
    /// region (`public_column_count()..=column_count()`).
    pub fn insert_backlink_column(
        &mut self,
        ndx: usize,
        origin: TableKey,
        origin_ndx: usize,
    ) -> Result<()> {
        if ndx < self.public_count || ndx > self.columns.len() {
            return Err(SchemaError::IndexOutOfRange {
                ndx,
                limit: self.columns.len(),
            });
        }
        trace!(ndx, %origin, origin_ndx, "insert backlink column");
        self.columns
            .insert(ndx, ColumnSpec::backlink(origin, origin_ndx));
        Ok(())
    }

    /// Remove the backlink column at `ndx`.
    pub fn erase_backlink_column(&mut self, ndx: usize) -> Result<ColumnSpec> {
        if ndx < self.public_count || ndx >= self.columns.len() {
            return Err(SchemaError::IndexOutOfRange {
                ndx,
                limit: self.columns.len(),
            });
        }
        trace!(ndx, "erase backlink column");
        Ok(self.columns.remove(ndx))
    }

    // -----------------------------------------------------------------------
    // Cross-table fixups
    // -----------------------------------------------------------------------

    /// Adjust link columns targeting `target` after a column was inserted
    /// into (or erased from) `target` at position `at`.
    pub fn shift_link_targets(&mut self, target: TableKey, at: usize, inserted: bool) {
        for col in &mut self.columns {
            if let Some(link) = col.link.as_mut() {
                if link.target == target && link.backlink_ndx >= at {
                    if inserted {
                        link.backlink_ndx += 1;
                    } else if link.backlink_ndx > at {
                        link.backlink_ndx -= 1;
                    }
                }
            }
        }
    }

    /// Adjust backlink columns mirroring `origin` after a column was
    /// inserted into (or erased from) `origin` at position `at`.
    pub fn shift_backlink_origins(&mut self, origin: TableKey, at: usize, inserted: bool) {
        for col in &mut self.columns {
            if let Some(back) = col.backlink.as_mut() {
                if back.origin == origin && back.origin_ndx >= at {
                    if inserted {
                        back.origin_ndx += 1;
                    } else if back.origin_ndx > at {
                        back.origin_ndx -= 1;
                    }
                }
            }
        }
    }
}

impl SchemaDescriptor for Spec {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn public_column_count(&self) -> usize {
        self.public_count
    }

    fn column(&self, ndx: usize) -> Option<&ColumnSpec> {
        self.columns.get(ndx)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns[..self.public_count]
            .iter()
            .position(|c| c.name == name)
    }

    fn find_backlink_column(&self, origin: TableKey, origin_ndx: usize) -> Option<usize> {
        (self.public_count..self.columns.len()).find(|&ndx| {
            self.columns[ndx]
                .backlink
                .is_some_and(|b| b.origin == origin && b.origin_ndx == origin_ndx)
        })
    }

    fn primary_key(&self) -> Option<usize> {
        self.primary_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(name: &str) -> ColumnSpec {
        ColumnSpec::new(name, DataType::Int, false)
    }

    fn t(n: u32) -> TableKey {
        TableKey::new(n)
    }

    // -----------------------------------------------------------------------
    // Public columns
    // -----------------------------------------------------------------------

    #[test]
    fn insert_and_lookup() {
        let mut spec = Spec::default();
        spec.insert_column(0, int("a")).unwrap();
        spec.insert_column(1, int("c")).unwrap();
        spec.insert_column(1, int("b")).unwrap();
        assert_eq!(spec.public_column_count(), 3);
        assert_eq!(spec.column_index("b"), Some(1));
        assert_eq!(spec.column_index("c"), Some(2));
        assert_eq!(spec.column_name(0), Some("a"));
        assert_eq!(spec.column_type(2), Some(DataType::Int));
    }

    #[test]
    fn insert_past_end_fails() {
        let mut spec = Spec::default();
        assert_eq!(
            spec.insert_column(1, int("a")),
            Err(SchemaError::IndexOutOfRange { ndx: 1, limit: 0 })
        );
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut spec = Spec::default();
        spec.insert_column(0, int("a")).unwrap();
        assert!(matches!(
            spec.insert_column(1, int("a")),
            Err(SchemaError::DuplicateColumn { .. })
        ));
        spec.insert_column(1, int("b")).unwrap();
        assert!(spec.rename_column(1, "a").is_err());
        spec.rename_column(1, "b").unwrap();
    }

    #[test]
    fn name_length_is_configurable() {
        let mut spec = Spec::new(4);
        assert!(spec.insert_column(0, int("abcd")).is_ok());
        assert!(spec.insert_column(1, int("abcde")).is_err());
    }

    #[test]
    fn erase_returns_descriptor() {
        let mut spec = Spec::default();
        spec.insert_column(0, int("a")).unwrap();
        spec.insert_column(1, int("b")).unwrap();
        let col = spec.erase_column(0).unwrap();
        assert_eq!(col.name, "a");
        assert_eq!(spec.column_index("b"), Some(0));
        assert!(spec.erase_column(1).is_err());
    }

    // -----------------------------------------------------------------------
    // Primary key and search index
    // -----------------------------------------------------------------------

    #[test]
    fn primary_key_follows_shifts() {
        let mut spec = Spec::default();
        spec.insert_column(0, int("id")).unwrap();
        spec.set_primary_key(Some(0)).unwrap();
        assert!(spec.has_search_index(0));

        spec.insert_column(0, int("x")).unwrap();
        assert_eq!(spec.primary_key(), Some(1));
        spec.erase_column(0).unwrap();
        assert_eq!(spec.primary_key(), Some(0));
        spec.erase_column(0).unwrap();
        assert_eq!(spec.primary_key(), None);
    }

    #[test]
    fn primary_key_index_cannot_be_removed() {
        let mut spec = Spec::default();
        spec.insert_column(0, int("id")).unwrap();
        spec.set_primary_key(Some(0)).unwrap();
        assert_eq!(
            spec.set_search_index(0, false),
            Err(SchemaError::PrimaryKeyIndex { ndx: 0 })
        );
        spec.set_primary_key(None).unwrap();
        spec.set_search_index(0, false).unwrap();
        assert!(!spec.has_search_index(0));
    }

    #[test]
    fn unindexable_types_rejected() {
        let mut spec = Spec::default();
        spec.insert_column(0, ColumnSpec::new("d", DataType::Double, false))
            .unwrap();
        assert_eq!(
            spec.set_search_index(0, true),
            Err(SchemaError::NotIndexable { ndx: 0 })
        );
    }

    // -----------------------------------------------------------------------
    // Links and backlinks
    // -----------------------------------------------------------------------

    #[test]
    fn backlinks_stay_behind_public_columns() {
        let mut spec = Spec::default();
        spec.insert_column(0, int("a")).unwrap();
        let back = spec.add_backlink_column(t(1), 0);
        assert_eq!(back, 1);
        spec.insert_column(1, int("b")).unwrap();
        assert_eq!(spec.public_column_count(), 2);
        assert_eq!(spec.column_count(), 3);
        assert_eq!(spec.find_backlink_column(t(1), 0), Some(2));
        assert_eq!(spec.backlink_columns(), 2..3);
        assert_eq!(spec.column_index("!backlink_t1_0"), None);
    }

    #[test]
    fn insert_backlink_within_backlink_region() {
        let mut spec = Spec::default();
        spec.insert_column(0, int("a")).unwrap();
        spec.add_backlink_column(t(1), 0);
        assert!(spec.insert_backlink_column(0, t(2), 0).is_err());
        assert!(spec.insert_backlink_column(3, t(2), 0).is_err());
        spec.insert_backlink_column(1, t(2), 0).unwrap();
        assert_eq!(spec.find_backlink_column(t(2), 0), Some(1));
        assert_eq!(spec.find_backlink_column(t(1), 0), Some(2));
    }

    #[test]
    fn erase_backlink_rejects_public_index() {
        let mut spec = Spec::default();
        spec.insert_column(0, int("a")).unwrap();
        assert!(spec.erase_backlink_column(0).is_err());
        spec.add_backlink_column(t(0), 0);
        assert!(spec.erase_backlink_column(1).is_ok());
    }

    #[test]
    fn shift_link_targets() {
        let mut spec = Spec::default();
        let mut link = ColumnSpec::link("l", DataType::Link, t(2), LinkType::Weak);
        link.link.as_mut().unwrap().backlink_ndx = 3;
        spec.insert_column(0, link).unwrap();

        spec.shift_link_targets(t(2), 1, true);
        assert_eq!(spec.link_info(0).unwrap().backlink_ndx, 4);
        spec.shift_link_targets(t(9), 0, true);
        assert_eq!(spec.link_info(0).unwrap().backlink_ndx, 4);
        spec.shift_link_targets(t(2), 0, false);
        assert_eq!(spec.link_info(0).unwrap().backlink_ndx, 3);
    }

    #[test]
    fn shift_backlink_origins() {
        let mut spec = Spec::default();
        spec.add_backlink_column(t(4), 2);
        spec.shift_backlink_origins(t(4), 0, true);
        assert_eq!(spec.find_backlink_column(t(4), 3), Some(0));
        spec.shift_backlink_origins(t(4), 1, false);
        assert_eq!(spec.find_backlink_column(t(4), 2), Some(0));
    }

    #[test]
    fn set_link_type_requires_link_column() {
        let mut spec = Spec::default();
        spec.insert_column(0, int("a")).unwrap();
        spec.insert_column(
            1,
            ColumnSpec::link("l", DataType::LinkList, t(0), LinkType::Weak),
        )
        .unwrap();
        assert_eq!(
            spec.set_link_type(0, LinkType::Strong),
            Err(SchemaError::NotALinkColumn { ndx: 0 })
        );
        assert_eq!(spec.set_link_type(1, LinkType::Strong), Ok(LinkType::Weak));
        assert_eq!(spec.link_type(1), Some(LinkType::Strong));
        assert_eq!(spec.link_columns(), vec![1]);
    }
}

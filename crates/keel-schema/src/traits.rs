//! The [`SchemaDescriptor`] trait: read access to a table's column layout.

use keel_types::{DataType, LinkType, TableKey};

use crate::column::{ColumnSpec, LinkInfo};

/// Read-only view of a table's columns.
///
/// Column indices are positional. Indices `0..public_column_count()` are the
/// public columns; indices from `public_column_count()` up to
/// `column_count()` are backlink columns.
pub trait SchemaDescriptor {
    /// Total number of columns, backlink columns included.
    fn column_count(&self) -> usize;

    /// Number of user-visible columns.
    fn public_column_count(&self) -> usize;

    /// Borrow the descriptor of column `ndx`, if it exists.
    fn column(&self, ndx: usize) -> Option<&ColumnSpec>;

    /// Index of the public column named `name`.
    fn column_index(&self, name: &str) -> Option<usize>;

    /// Index of the backlink column mirroring `origin_ndx` in `origin`.
    fn find_backlink_column(&self, origin: TableKey, origin_ndx: usize) -> Option<usize>;

    /// Index of the primary key column, if one is set.
    fn primary_key(&self) -> Option<usize>;

    fn column_name(&self, ndx: usize) -> Option<&str> {
        self.column(ndx).map(|c| c.name.as_str())
    }

    fn column_type(&self, ndx: usize) -> Option<DataType> {
        self.column(ndx).map(|c| c.data_type)
    }

    fn is_nullable(&self, ndx: usize) -> bool {
        self.column(ndx).is_some_and(|c| c.nullable)
    }

    fn has_search_index(&self, ndx: usize) -> bool {
        self.column(ndx).is_some_and(|c| c.indexed)
    }

    fn link_info(&self, ndx: usize) -> Option<LinkInfo> {
        self.column(ndx).and_then(|c| c.link)
    }

    fn link_type(&self, ndx: usize) -> Option<LinkType> {
        self.link_info(ndx).map(|l| l.link_type)
    }

    /// Indices of all link and link-list columns.
    fn link_columns(&self) -> Vec<usize> {
        (0..self.public_column_count())
            .filter(|&ndx| self.link_info(ndx).is_some())
            .collect()
    }

    /// Indices of all backlink columns.
    fn backlink_columns(&self) -> std::ops::Range<usize> {
        self.public_column_count()..self.column_count()
    }
}

//! [`TableRef`]: the reference-counted table handle.

use std::fmt;
use std::sync::Arc;

use keel_schema::{ColumnSpec, SchemaDescriptor};
use keel_types::{DataType, Key, LinkType, TableKey, Value};

use crate::accessor::{HomeLink, TableAccessor};
use crate::chain::{Column, LinkChain};
use crate::config::GroupConfig;
use crate::data::{Effects, GroupData, TableData};
use crate::error::{TableError, TableResult};
use crate::group::GroupShared;
use crate::obj::Obj;
use crate::schema::BacklinkSlot;
use crate::value::ColumnValue;
use crate::view::{links_to, TableView, ViewSource};

/// A counted reference to a table accessor.
///
/// Cloning binds another reference; dropping the last one releases the
/// accessor. Every operation fails with [`TableError::Detached`] once the
/// table was removed or its group dropped.
pub struct TableRef {
    accessor: Arc<TableAccessor>,
}

impl TableRef {
    pub(crate) fn bind(accessor: Arc<TableAccessor>) -> Self {
        accessor.bind();
        Self { accessor }
    }

    /// A table that belongs to no group. It cannot hold link columns.
    pub fn freestanding(config: GroupConfig) -> Self {
        let (shared, key) = GroupShared::freestanding(config);
        Self::bind(Arc::new(TableAccessor::new(
            key,
            HomeLink::Owned(Arc::new(shared)),
        )))
    }

    pub(crate) fn accessor(&self) -> &Arc<TableAccessor> {
        &self.accessor
    }

    /// The shared state, with this accessor's layout brought up to date.
    pub(crate) fn attached(&self) -> TableResult<Arc<GroupShared>> {
        let shared = self.accessor.shared()?;
        self.accessor.ensure_fresh(&shared);
        if !self.accessor.is_attached() {
            return Err(TableError::Detached);
        }
        Ok(shared)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&TableData) -> TableResult<R>) -> TableResult<R> {
        let shared = self.attached()?;
        let data = shared.data.lock();
        let table = data.table(self.accessor.key)?;
        f(table)
    }

    pub(crate) fn read_group<R>(
        &self,
        f: impl FnOnce(&GroupData) -> TableResult<R>,
    ) -> TableResult<R> {
        let shared = self.attached()?;
        let data = shared.data.lock();
        f(&data)
    }

    pub(crate) fn mutate<R>(
        &self,
        f: impl FnOnce(&mut GroupData, TableKey, &mut Effects) -> TableResult<R>,
    ) -> TableResult<R> {
        let shared = self.attached()?;
        let key = self.accessor.key;
        shared.mutate(Some(self.accessor.as_ref()), |data, fx| f(data, key, fx))
    }

    /// Fails unless `other` lives in the same group as this table.
    fn same_group(&self, other: &TableRef) -> TableResult<()> {
        let mine = self.accessor.shared()?;
        let theirs = other.accessor.shared()?;
        if Arc::ptr_eq(&mine, &theirs) {
            Ok(())
        } else {
            Err(TableError::IllegalCombination(
                "tables belong to different groups".into(),
            ))
        }
    }

    pub fn is_attached(&self) -> bool {
        self.accessor.is_attached()
    }

    pub fn get_key(&self) -> TableKey {
        self.accessor.key
    }

    /// Table name. Freestanding tables have an empty name.
    pub fn get_name(&self) -> TableResult<String> {
        self.read(|t| Ok(t.name.clone()))
    }

    pub fn size(&self) -> TableResult<usize> {
        self.read(|t| Ok(t.store.len()))
    }

    pub fn is_empty(&self) -> TableResult<bool> {
        Ok(self.size()? == 0)
    }

    /// Row, list, and view handles currently bound to this table, valid or
    /// not.
    pub fn live_handles(&self) -> usize {
        self.accessor.registry.lock().live()
    }

    // ---- Schema ----

    /// Append a value column. Returns its index.
    pub fn add_column(&self, data_type: DataType, name: &str, nullable: bool) -> TableResult<usize> {
        check_value_type(data_type)?;
        self.mutate(|data, table, fx| {
            let ndx = data.table(table)?.spec.public_column_count();
            data.insert_column(table, ndx, ColumnSpec::new(name, data_type, nullable), fx)?;
            Ok(ndx)
        })
    }

    pub fn insert_column(
        &self,
        ndx: usize,
        data_type: DataType,
        name: &str,
        nullable: bool,
    ) -> TableResult<()> {
        check_value_type(data_type)?;
        self.mutate(|data, table, fx| {
            data.insert_column(table, ndx, ColumnSpec::new(name, data_type, nullable), fx)
        })
    }

    /// Append a link or link-list column targeting `target`, with its
    /// backlink column appended to the target. Returns the column index.
    pub fn add_column_link(
        &self,
        data_type: DataType,
        name: &str,
        target: &TableRef,
        link_type: LinkType,
    ) -> TableResult<usize> {
        self.insert_link(None, data_type, name, target, link_type, BacklinkSlot::Append)
    }

    pub fn insert_column_link(
        &self,
        ndx: usize,
        data_type: DataType,
        name: &str,
        target: &TableRef,
        link_type: LinkType,
        slot: BacklinkSlot,
    ) -> TableResult<()> {
        self.insert_link(Some(ndx), data_type, name, target, link_type, slot)
            .map(|_| ())
    }

    /// Append a link-list column.
    pub fn add_column_list(
        &self,
        name: &str,
        target: &TableRef,
        link_type: LinkType,
    ) -> TableResult<usize> {
        self.add_column_link(DataType::LinkList, name, target, link_type)
    }

    fn insert_link(
        &self,
        ndx: Option<usize>,
        data_type: DataType,
        name: &str,
        target: &TableRef,
        link_type: LinkType,
        slot: BacklinkSlot,
    ) -> TableResult<usize> {
        if !self.accessor.is_group_level() || !target.accessor.is_group_level() {
            return Err(TableError::NotGroupLevel);
        }
        self.same_group(target)?;
        let target = target.get_key();
        self.mutate(|data, table, fx| {
            let ndx = match ndx {
                Some(ndx) => ndx,
                None => data.table(table)?.spec.public_column_count(),
            };
            data.insert_link_column(table, ndx, name, data_type, target, link_type, slot, fx)?;
            Ok(ndx)
        })
    }

    /// Remove a column. Removing a link column breaks all of its links.
    pub fn remove_column(&self, ndx: usize) -> TableResult<()> {
        self.mutate(|data, table, fx| data.remove_column(table, ndx, fx))
    }

    pub fn rename_column(&self, ndx: usize, name: &str) -> TableResult<()> {
        self.mutate(|data, table, fx| data.rename_column(table, ndx, name, fx))
    }

    pub fn add_search_index(&self, ndx: usize) -> TableResult<()> {
        self.mutate(|data, table, fx| data.set_search_index(table, ndx, true, fx))
    }

    /// Fails with `PrimaryKeyIndex` on the primary key column.
    pub fn remove_search_index(&self, ndx: usize) -> TableResult<()> {
        self.mutate(|data, table, fx| data.set_search_index(table, ndx, false, fx))
    }

    pub fn has_search_index(&self, ndx: usize) -> TableResult<bool> {
        self.read(|t| Ok(t.check_column(ndx)?.indexed))
    }

    pub fn set_link_type(&self, ndx: usize, link_type: LinkType) -> TableResult<()> {
        self.mutate(|data, table, fx| data.set_link_type(table, ndx, link_type, fx))
    }

    /// Designate the primary key column; it gains a search index.
    pub fn set_primary_key(&self, ndx: Option<usize>) -> TableResult<()> {
        self.mutate(|data, table, fx| data.set_primary_key(table, ndx, fx))
    }

    pub fn get_primary_key(&self) -> TableResult<Option<usize>> {
        self.read(|t| Ok(t.spec.primary_key()))
    }

    /// Number of public columns.
    pub fn get_column_count(&self) -> TableResult<usize> {
        self.attached()?;
        Ok(self.accessor.public_column_count())
    }

    pub fn get_column_name(&self, ndx: usize) -> TableResult<String> {
        self.read(|t| Ok(t.check_column(ndx)?.name.clone()))
    }

    pub fn get_column_type(&self, ndx: usize) -> TableResult<DataType> {
        self.attached()?;
        Ok(self.accessor.column(ndx)?.data_type)
    }

    pub fn get_column_index(&self, name: &str) -> TableResult<Option<usize>> {
        self.read(|t| Ok(t.spec.column_index(name)))
    }

    pub fn is_nullable(&self, ndx: usize) -> TableResult<bool> {
        self.attached()?;
        Ok(self.accessor.column(ndx)?.nullable)
    }

    /// The table link column `ndx` points into.
    pub fn get_link_target(&self, ndx: usize) -> TableResult<TableRef> {
        let shared = self.attached()?;
        let (target, hint) = self.accessor.link_target(ndx)?;
        shared.bind_hinted(target, &hint)
    }

    // ---- Objects ----

    /// Create an object with the next generated key.
    pub fn create_object(&self) -> TableResult<Obj> {
        let key = self.mutate(|data, table, fx| data.create_object(table, None, fx))?;
        Ok(Obj::new(self.clone(), key))
    }

    /// Create an object under an explicit key. Keys that are live, or were
    /// used before while `strict_key_reuse` is set, are rejected.
    pub fn create_object_with_key(&self, key: Key) -> TableResult<Obj> {
        self.mutate(|data, table, fx| data.create_object(table, Some(key), fx))?;
        Ok(Obj::new(self.clone(), key))
    }

    pub fn create_objects(&self, count: usize) -> TableResult<Vec<Key>> {
        self.mutate(|data, table, fx| {
            (0..count)
                .map(|_| data.create_object(table, None, fx))
                .collect()
        })
    }

    /// Remove one object. Its links are broken, nothing else is removed.
    pub fn remove_object(&self, key: Key) -> TableResult<()> {
        self.mutate(|data, table, fx| data.remove_object(table, key, fx))
    }

    /// Remove an object and everything that loses its last strong
    /// referrer as a result. Returns how many objects were removed.
    pub fn remove_object_recursive(&self, key: Key) -> TableResult<usize> {
        self.mutate(|data, table, fx| data.remove_object_recursive(table, key, fx))
    }

    /// Remove every object, cascading like `remove_object_recursive`.
    pub fn clear(&self) -> TableResult<()> {
        self.mutate(|data, table, fx| data.clear(table, fx))
    }

    pub fn is_valid(&self, key: Key) -> bool {
        self.read(|t| Ok(t.store.is_valid(key))).unwrap_or(false)
    }

    pub fn get_object(&self, key: Key) -> TableResult<Obj> {
        self.read(|t| t.check_object(key))?;
        Ok(Obj::new(self.clone(), key))
    }

    /// Keys of all objects, ascending.
    pub fn keys(&self) -> TableResult<Vec<Key>> {
        self.read(|t| Ok(t.store.keys()))
    }

    // ---- Search ----

    /// First object whose cell in column `col` equals `value`.
    pub fn find_first(&self, col: usize, value: &Value) -> TableResult<Option<Key>> {
        self.read(|t| {
            let column = t.check_column(col)?;
            if let Some(requested) = value.data_type() {
                if requested != column.data_type {
                    return Err(TableError::TypeMismatch {
                        ndx: col,
                        expected: requested,
                        actual: column.data_type,
                    });
                }
            }
            Ok(t.store.find_first(col, &|cell| cell == value))
        })
    }

    pub fn find_first_null(&self, col: usize) -> TableResult<Option<Key>> {
        self.find_first(col, &Value::Null)
    }

    /// First object linking to `target`, scanning link columns in order.
    pub fn find_first_link(&self, target: Key) -> TableResult<Option<Key>> {
        self.read(|t| {
            Ok(t.spec
                .link_columns()
                .into_iter()
                .find_map(|ndx| t.store.find_first(ndx, &|cell| links_to(cell, target))))
        })
    }

    /// Every object linking to `target`, as a view.
    pub fn find_all_link(&self, target: Key) -> TableResult<TableView> {
        TableView::new(self.clone(), ViewSource::LinkTo(target))
    }

    /// All objects, as a view.
    pub fn view(&self) -> TableResult<TableView> {
        TableView::new(self.clone(), ViewSource::All)
    }

    // ---- Backlinks ----

    fn backlink_column(&self, origin: &TableRef, origin_col: usize) -> TableResult<usize> {
        self.same_group(origin)?;
        self.attached()?;
        self.accessor
            .find_backlink(origin.get_key(), origin_col)
            .ok_or(TableError::NotALinkColumn(origin_col))
    }

    /// The origin table of backlink column `ndx`, bound through the accessor
    /// recorded at the last refresh.
    pub(crate) fn backlink_origin(&self, ndx: usize) -> TableResult<TableRef> {
        let shared = self.attached()?;
        let (origin, hint) = self.accessor.backlink_origin(ndx)?;
        shared.bind_hinted(origin, &hint)
    }

    /// Number of links from column `origin_col` of `origin` to `key`.
    pub fn get_backlink_count(
        &self,
        key: Key,
        origin: &TableRef,
        origin_col: usize,
    ) -> TableResult<usize> {
        let ndx = self.backlink_column(origin, origin_col)?;
        self.read(|t| {
            t.check_object(key)?;
            Ok(t.linked_keys(key, ndx)?.len())
        })
    }

    /// The `i`th origin object linking to `key` through `origin_col`.
    pub fn get_backlink(
        &self,
        key: Key,
        origin: &TableRef,
        origin_col: usize,
        i: usize,
    ) -> TableResult<Key> {
        let ndx = self.backlink_column(origin, origin_col)?;
        self.read(|t| {
            t.check_object(key)?;
            let origins = t.linked_keys(key, ndx)?;
            origins.get(i).copied().ok_or(TableError::IndexOutOfBounds {
                ndx: i,
                size: origins.len(),
            })
        })
    }

    /// View over the objects of `origin` linking to `key`.
    pub fn get_backlink_view(
        &self,
        key: Key,
        origin: &TableRef,
        origin_col: usize,
    ) -> TableResult<TableView> {
        let ndx = self.backlink_column(origin, origin_col)?;
        self.read(|t| t.check_object(key))?;
        TableView::new(
            self.backlink_origin(ndx)?,
            ViewSource::Backlinks {
                target: self.get_key(),
                key,
                origin_ndx: origin_col,
            },
        )
    }

    // ---- Versioning ----

    /// Current version. A changed value means cached results are stale.
    pub fn get_version_counter(&self) -> TableResult<u64> {
        self.read(|t| Ok(t.version))
    }

    // ---- Traversal ----

    /// Start a chain following link column `col`.
    pub fn link(&self, col: usize) -> TableResult<LinkChain> {
        LinkChain::new(self.clone()).link(col)
    }

    /// Start a chain following links from `origin_col` of `origin` back to
    /// this table.
    pub fn backlink(&self, origin: &TableRef, origin_col: usize) -> TableResult<LinkChain> {
        LinkChain::new(self.clone()).backlink(origin, origin_col)
    }

    /// Typed access to column `col` of this table.
    pub fn column<T: ColumnValue>(&self, col: usize) -> TableResult<Column<T>> {
        LinkChain::new(self.clone()).column(col)
    }
}

fn check_value_type(data_type: DataType) -> TableResult<()> {
    if data_type.is_link() || data_type == DataType::BackLink {
        return Err(TableError::IllegalCombination(format!(
            "{data_type} columns are created with add_column_link"
        )));
    }
    Ok(())
}

impl Clone for TableRef {
    fn clone(&self) -> Self {
        Self::bind(Arc::clone(&self.accessor))
    }
}

impl Drop for TableRef {
    fn drop(&mut self) {
        self.accessor.unbind();
    }
}

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.accessor, &other.accessor)
    }
}

impl Eq for TableRef {}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRef")
            .field("key", &self.accessor.key)
            .field("attached", &self.is_attached())
            .finish()
    }
}

//! [`Obj`]: a handle to one object of a table.

use std::fmt;

use keel_schema::SchemaDescriptor;
use keel_types::{DataType, Key, Value};

use crate::error::{TableError, TableResult};
use crate::link_list::LinkList;
use crate::registry::{HandleKind, Ticket};
use crate::table::TableRef;
use crate::value::{check_type, decode, ColumnValue};

/// A row handle, registered with its table accessor.
///
/// The handle turns invalid when its object is removed, whether directly,
/// by a cascade, or by `clear`, and when the table is detached. A mutation
/// that cascades may remove the very object it was issued through, so check
/// [`is_valid`](Self::is_valid) before reusing a handle after one.
pub struct Obj {
    table: TableRef,
    key: Key,
    ticket: Ticket,
}

impl Obj {
    pub(crate) fn new(table: TableRef, key: Key) -> Self {
        let ticket = table.accessor().registry.lock().register(HandleKind::Row(key));
        Self { table, key, ticket }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn is_valid(&self) -> bool {
        self.table.is_attached() && self.table.accessor().registry.lock().is_valid(self.ticket)
    }

    fn check(&self) -> TableResult<()> {
        if !self.table.is_attached() {
            return Err(TableError::Detached);
        }
        if !self.table.accessor().registry.lock().is_valid(self.ticket) {
            return Err(TableError::NoSuchObject(self.key));
        }
        Ok(())
    }

    fn column_type(&self, col: usize) -> TableResult<DataType> {
        self.check()?;
        self.table.get_column_type(col)
    }

    // ---- Values ----

    pub fn get<T: ColumnValue>(&self, col: usize) -> TableResult<T> {
        check_type::<T>(col, self.column_type(col)?)?;
        let value = self.get_value(col)?;
        decode(col, &value)
    }

    pub fn set<T: ColumnValue>(&self, col: usize, value: T) -> TableResult<()> {
        check_type::<T>(col, self.column_type(col)?)?;
        self.set_value(col, value.into_value())
    }

    /// The raw cell. Link-list cells come back as `Value::LinkList`.
    pub fn get_value(&self, col: usize) -> TableResult<Value> {
        self.check()?;
        self.table.read(|t| {
            t.check_column(col)?;
            Ok(t.cell(self.key, col)?.clone())
        })
    }

    pub fn set_value(&self, col: usize, value: Value) -> TableResult<()> {
        self.check()?;
        let key = self.key;
        self.table
            .mutate(|data, table, fx| data.set_value(table, key, col, value, fx))
    }

    /// Store null. Fails on columns that are not nullable.
    pub fn set_null(&self, col: usize) -> TableResult<()> {
        match self.column_type(col)? {
            DataType::Link => self.nullify_link(col),
            _ => self.set_value(col, Value::Null),
        }
    }

    pub fn is_null(&self, col: usize) -> TableResult<bool> {
        Ok(self.get_value(col)?.is_null())
    }

    // ---- Links ----

    pub fn get_link(&self, col: usize) -> TableResult<Option<Key>> {
        match self.column_type(col)? {
            DataType::Link => Ok(self.get_value(col)?.as_link()),
            actual => Err(TableError::TypeMismatch {
                ndx: col,
                expected: DataType::Link,
                actual,
            }),
        }
    }

    /// Point link column `col` at `target`. Replacing a strong link may
    /// cascade-remove the previous target.
    pub fn set_link(&self, col: usize, target: Key) -> TableResult<()> {
        self.write_link(col, Some(target))
    }

    pub fn nullify_link(&self, col: usize) -> TableResult<()> {
        self.write_link(col, None)
    }

    fn write_link(&self, col: usize, target: Option<Key>) -> TableResult<()> {
        self.check()?;
        let key = self.key;
        self.table
            .mutate(|data, table, fx| data.set_link(table, col, key, target, fx))
    }

    pub fn get_linklist(&self, col: usize) -> TableResult<LinkList> {
        self.check()?;
        LinkList::new(self.table.clone(), self.key, col)
    }

    /// Number of links pointing at this object, over all origin columns.
    pub fn get_backlink_count(&self) -> TableResult<usize> {
        self.check()?;
        self.table.read(|t| {
            let mut count = 0;
            for ndx in t.spec.backlink_columns() {
                count += t.linked_keys(self.key, ndx)?.len();
            }
            Ok(count)
        })
    }

    /// Remove this object. Links are broken without cascading.
    pub fn remove(&self) -> TableResult<()> {
        self.check()?;
        self.table.remove_object(self.key)
    }
}

impl Drop for Obj {
    fn drop(&mut self) {
        self.table.accessor().registry.lock().unregister(self.ticket);
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obj")
            .field("table", &self.table.get_key())
            .field("key", &self.key)
            .field("valid", &self.is_valid())
            .finish()
    }
}

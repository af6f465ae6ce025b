//! [`TableView`]: a snapshot of object keys that knows when it is stale.

use std::fmt;

use keel_schema::SchemaDescriptor;
use keel_types::{Key, TableKey, Value};

use crate::data::GroupData;
use crate::error::{TableError, TableResult};
use crate::obj::Obj;
use crate::registry::{HandleKind, Ticket};
use crate::table::TableRef;

/// What a view was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ViewSource {
    /// Every object of the table.
    All,
    /// Objects with any link column pointing at this key.
    LinkTo(Key),
    /// Objects whose column `origin_ndx` links to `key` in `target`.
    Backlinks {
        target: TableKey,
        key: Key,
        origin_ndx: usize,
    },
}

/// Whether a link or link-list cell references `target`.
pub(crate) fn links_to(cell: &Value, target: Key) -> bool {
    match cell {
        Value::Link(key) => *key == target,
        Value::LinkList(keys) => keys.contains(target),
        _ => false,
    }
}

/// Keys of a table, captured together with the table version they were
/// read at.
pub struct TableView {
    table: TableRef,
    source: ViewSource,
    keys: Vec<Key>,
    version: u64,
    ticket: Ticket,
}

impl TableView {
    pub(crate) fn new(table: TableRef, source: ViewSource) -> TableResult<Self> {
        let ticket = table.accessor().registry.lock().register(HandleKind::View);
        let mut view = Self {
            table,
            source,
            keys: Vec::new(),
            version: 0,
            ticket,
        };
        view.sync()?;
        Ok(view)
    }

    fn sync(&mut self) -> TableResult<()> {
        let origin = self.table.get_key();
        let source = self.source;
        let (version, keys) = self.table.read_group(|data| {
            let table = data.table(origin)?;
            Ok((table.version, collect(data, origin, source)?))
        })?;
        self.version = version;
        self.keys = keys;
        Ok(())
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn is_attached(&self) -> bool {
        self.table.is_attached() && self.table.accessor().registry.lock().is_valid(self.ticket)
    }

    /// True while the table version matches the one the keys were read at.
    pub fn is_in_sync(&self) -> bool {
        self.is_attached()
            && self
                .table
                .get_version_counter()
                .is_ok_and(|current| current == self.version)
    }

    /// Re-read the keys if the table changed. Returns whether it did.
    pub fn sync_if_needed(&mut self) -> TableResult<bool> {
        if !self.is_attached() {
            return Err(TableError::Detached);
        }
        if self.is_in_sync() {
            return Ok(false);
        }
        self.sync()?;
        Ok(true)
    }

    pub fn size(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, i: usize) -> TableResult<Key> {
        self.keys.get(i).copied().ok_or(TableError::IndexOutOfBounds {
            ndx: i,
            size: self.keys.len(),
        })
    }

    /// Handle to the `i`th object. Fails if it was removed since the last
    /// sync.
    pub fn get_object(&self, i: usize) -> TableResult<Obj> {
        self.table.get_object(self.get(i)?)
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }
}

fn collect(data: &GroupData, origin: TableKey, source: ViewSource) -> TableResult<Vec<Key>> {
    let table = data.table(origin)?;
    match source {
        ViewSource::All => Ok(table.store.keys()),
        ViewSource::LinkTo(target) => {
            let columns = table.spec.link_columns();
            let mut keys = Vec::new();
            for key in table.store.keys() {
                let record = table.store.get(key)?;
                if columns
                    .iter()
                    .any(|&ndx| record.get(ndx).is_ok_and(|cell| links_to(cell, target)))
                {
                    keys.push(key);
                }
            }
            Ok(keys)
        }
        ViewSource::Backlinks {
            target,
            key,
            origin_ndx,
        } => {
            let target = data.table(target)?;
            if !target.store.is_valid(key) {
                return Ok(Vec::new());
            }
            let ndx = target
                .spec
                .find_backlink_column(origin, origin_ndx)
                .ok_or(TableError::NotALinkColumn(origin_ndx))?;
            target.linked_keys(key, ndx)
        }
    }
}

impl Drop for TableView {
    fn drop(&mut self) {
        self.table.accessor().registry.lock().unregister(self.ticket);
    }
}

impl fmt::Debug for TableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableView")
            .field("table", &self.table.get_key())
            .field("source", &self.source)
            .field("keys", &self.keys)
            .field("version", &self.version)
            .finish()
    }
}

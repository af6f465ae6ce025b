//! Storage behind the accessors: one [`TableData`] per table, held by a
//! [`GroupData`].
//!
//! Everything here is reached only through the group's data lock. Handles
//! never hold references into this module; they address tables by
//! [`TableKey`] and objects by [`Key`].

use std::collections::BTreeSet;

use keel_schema::{validate_table_name, ColumnSpec, SchemaDescriptor, Spec};
use keel_store::{InMemoryObjectStore, ObjectRecord, ObjectStore};
use keel_types::{Key, TableKey, Value};

use crate::config::GroupConfig;
use crate::error::{TableError, TableResult};
use crate::replication::Instruction;

/// Side effects of one mutating operation, applied once the data lock is
/// released.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    /// Tables whose version must be bumped.
    pub(crate) touched: BTreeSet<TableKey>,
    /// Objects that no longer exist.
    pub(crate) removed: Vec<(TableKey, Key)>,
    /// Tables whose column layout changed, with the first shifted index.
    pub(crate) reshaped: Vec<(TableKey, usize)>,
    pub(crate) instructions: Vec<Instruction>,
}

impl Effects {
    pub(crate) fn touch(&mut self, table: TableKey) {
        self.touched.insert(table);
    }

    pub(crate) fn record(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub(crate) fn reshape(&mut self, table: TableKey, from: usize) {
        self.touched.insert(table);
        self.reshaped.push((table, from));
    }
}

/// Schema, rows, key counter, and version of one table.
#[derive(Debug)]
pub(crate) struct TableData {
    pub(crate) key: TableKey,
    pub(crate) name: String,
    pub(crate) spec: Spec,
    pub(crate) store: Box<dyn ObjectStore>,
    next_key: i64,
    /// Removed keys, kept only under strict key reuse. Every entry lies
    /// below `next_key`, so generated keys never need to consult it.
    retired: BTreeSet<Key>,
    pub(crate) version: u64,
}

impl TableData {
    pub(crate) fn new(key: TableKey, name: String, max_name_len: usize) -> Self {
        Self {
            key,
            name,
            spec: Spec::new(max_name_len),
            store: Box::new(InMemoryObjectStore::new()),
            next_key: 0,
            retired: BTreeSet::new(),
            version: 0,
        }
    }

    /// Descriptor of public column `ndx`.
    pub(crate) fn check_column(&self, ndx: usize) -> TableResult<&ColumnSpec> {
        let count = self.spec.public_column_count();
        if ndx >= count {
            return Err(TableError::ColumnDoesNotExist { ndx, count });
        }
        self.spec
            .column(ndx)
            .ok_or(TableError::ColumnDoesNotExist { ndx, count })
    }

    pub(crate) fn check_object(&self, key: Key) -> TableResult<()> {
        if self.store.is_valid(key) {
            Ok(())
        } else {
            Err(TableError::NoSuchObject(key))
        }
    }

    /// Next key from the monotonic counter, skipping keys claimed explicitly.
    pub(crate) fn allocate_key(&mut self) -> TableResult<Key> {
        loop {
            let key = Key::new(self.next_key).map_err(|_| TableError::KeysExhausted)?;
            self.next_key += 1;
            if !self.store.is_valid(key) {
                return Ok(key);
            }
        }
    }

    /// Reserve an explicitly supplied key.
    pub(crate) fn claim_key(&mut self, key: Key, strict: bool) -> TableResult<()> {
        if self.store.is_valid(key) || (strict && self.retired.contains(&key)) {
            return Err(TableError::KeyAlreadyUsed(key));
        }
        if key.value() >= self.next_key {
            self.next_key = key.value() + 1;
        }
        self.retired.remove(&key);
        Ok(())
    }

    pub(crate) fn retire(&mut self, key: Key) {
        self.retired.insert(key);
    }

    #[cfg(test)]
    pub(crate) fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// A record holding the default value of every column.
    pub(crate) fn new_record(&self) -> ObjectRecord {
        ObjectRecord::new(
            self.spec
                .columns()
                .iter()
                .map(ColumnSpec::default_value)
                .collect(),
        )
    }

    pub(crate) fn cell(&self, key: Key, ndx: usize) -> TableResult<&Value> {
        let record = self
            .store
            .get(key)
            .map_err(|_| TableError::NoSuchObject(key))?;
        Ok(record.get(ndx)?)
    }

    pub(crate) fn cell_mut(&mut self, key: Key, ndx: usize) -> TableResult<&mut Value> {
        let record = self
            .store
            .get_mut(key)
            .map_err(|_| TableError::NoSuchObject(key))?;
        Ok(record.get_mut(ndx)?)
    }

    /// Keys held in a link, link-list, or backlink cell, in stored order.
    pub(crate) fn linked_keys(&self, key: Key, ndx: usize) -> TableResult<Vec<Key>> {
        Ok(match self.cell(key, ndx)? {
            Value::Link(target) => vec![*target],
            Value::LinkList(keys) | Value::BackLinks(keys) => keys.keys().collect(),
            _ => Vec::new(),
        })
    }

    /// Tables on the far side of any link or backlink column.
    pub(crate) fn linked_tables(&self) -> Vec<TableKey> {
        self.spec
            .columns()
            .iter()
            .filter_map(|col| {
                col.link
                    .map(|l| l.target)
                    .or_else(|| col.backlink.map(|b| b.origin))
            })
            .collect()
    }
}

/// All tables of one group (or the single table of a freestanding accessor).
#[derive(Debug)]
pub(crate) struct GroupData {
    tables: Vec<Option<TableData>>,
    pub(crate) config: GroupConfig,
}

impl GroupData {
    pub(crate) fn new(config: GroupConfig) -> Self {
        Self {
            tables: Vec::new(),
            config,
        }
    }

    pub(crate) fn table(&self, key: TableKey) -> TableResult<&TableData> {
        self.tables
            .get(key.slot())
            .and_then(Option::as_ref)
            .ok_or(TableError::Detached)
    }

    pub(crate) fn table_mut(&mut self, key: TableKey) -> TableResult<&mut TableData> {
        self.tables
            .get_mut(key.slot())
            .and_then(Option::as_mut)
            .ok_or(TableError::Detached)
    }

    pub(crate) fn has_table(&self, key: TableKey) -> bool {
        self.table(key).is_ok()
    }

    pub(crate) fn tables(&self) -> impl Iterator<Item = &TableData> {
        self.tables.iter().flatten()
    }

    pub(crate) fn tables_mut(&mut self) -> impl Iterator<Item = &mut TableData> {
        self.tables.iter_mut().flatten()
    }

    pub(crate) fn table_keys(&self) -> Vec<TableKey> {
        self.tables().map(|t| t.key).collect()
    }

    pub(crate) fn find_table(&self, name: &str) -> Option<TableKey> {
        self.tables().find(|t| t.name == name).map(|t| t.key)
    }

    /// Create a table in a fresh slot. Slots of removed tables stay empty.
    pub(crate) fn add_table(&mut self, name: &str) -> TableResult<TableKey> {
        validate_table_name(name, self.config.max_column_name_length)?;
        if self.find_table(name).is_some() {
            return Err(TableError::TableNameInUse(name.to_string()));
        }
        let key = TableKey::new(self.tables.len() as u32);
        self.tables.push(Some(TableData::new(
            key,
            name.to_string(),
            self.config.max_column_name_length,
        )));
        Ok(key)
    }

    /// Create the nameless table of a freestanding accessor.
    pub(crate) fn add_unnamed_table(&mut self) -> TableKey {
        let key = TableKey::new(self.tables.len() as u32);
        self.tables.push(Some(TableData::new(
            key,
            String::new(),
            self.config.max_column_name_length,
        )));
        key
    }

    pub(crate) fn take_table(&mut self, key: TableKey) -> Option<TableData> {
        self.tables.get_mut(key.slot()).and_then(Option::take)
    }

    /// Number of strong links currently pointing at `key` in `table`.
    pub(crate) fn strong_referrers(&self, table: TableKey, key: Key) -> TableResult<usize> {
        let target = self.table(table)?;
        let mut count = 0;
        for ndx in target.spec.backlink_columns() {
            let Some(back) = target.spec.column(ndx).and_then(|c| c.backlink) else {
                continue;
            };
            let strong = self
                .table(back.origin)?
                .spec
                .column(back.origin_ndx)
                .is_some_and(ColumnSpec::is_strong);
            if strong {
                count += target.cell(key, ndx)?.as_keys().map_or(0, |k| k.len());
            }
        }
        Ok(count)
    }

    /// Create an object, with a generated key unless one is supplied.
    pub(crate) fn create_object(
        &mut self,
        table: TableKey,
        key: Option<Key>,
        fx: &mut Effects,
    ) -> TableResult<Key> {
        let strict = self.config.strict_key_reuse;
        let data = self.table_mut(table)?;
        let key = match key {
            Some(key) => {
                data.claim_key(key, strict)?;
                key
            }
            None => data.allocate_key()?,
        };
        let record = data.new_record();
        data.store.insert(key, record)?;
        fx.touch(table);
        fx.record(Instruction::CreateObject { table, key });
        Ok(key)
    }

    /// Overwrite a non-link cell.
    pub(crate) fn set_value(
        &mut self,
        table: TableKey,
        key: Key,
        ndx: usize,
        value: Value,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let data = self.table_mut(table)?;
        let column = data.check_column(ndx)?;
        if column.link.is_some() {
            return Err(TableError::IllegalCombination(format!(
                "column {:?} holds links; use the link operations",
                column.name
            )));
        }
        match value.data_type() {
            None if !column.nullable => {
                return Err(TableError::IllegalCombination(format!(
                    "column {:?} is not nullable",
                    column.name
                )));
            }
            Some(actual) if actual != column.data_type => {
                return Err(TableError::TypeMismatch {
                    ndx,
                    expected: actual,
                    actual: column.data_type,
                });
            }
            _ => {}
        }
        *data.cell_mut(key, ndx)? = value.clone();
        fx.touch(table);
        fx.record(Instruction::Set {
            table,
            key,
            ndx,
            value,
        });
        Ok(())
    }
}

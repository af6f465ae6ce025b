//! Schema mutation with cross-table fixups.
//!
//! Link columns store the index of their backlink column in the target,
//! and backlink columns store the index of their origin column. Any column
//! insertion or removal therefore rewrites those indices in every table.

use tracing::debug;

use keel_schema::{ColumnSpec, SchemaDescriptor};
use keel_types::{DataType, Key, KeyArray, LinkType, TableKey, Value};

use crate::cascade::{CascadeMode, CascadeState};
use crate::data::{Effects, GroupData};
use crate::error::{TableError, TableResult};
use crate::replication::Instruction;

/// Where the backlink column of a new link column goes in the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BacklinkSlot {
    /// After every existing column of the target.
    #[default]
    Append,
    /// At this absolute column index, which must lie in the target's
    /// backlink region.
    At(usize),
}

impl GroupData {
    fn shift_columns(&mut self, table: TableKey, at: usize, inserted: bool) {
        for data in self.tables_mut() {
            data.spec.shift_link_targets(table, at, inserted);
            data.spec.shift_backlink_origins(table, at, inserted);
        }
    }

    /// Insert a value column, or the forward half of a link column.
    pub(crate) fn insert_column(
        &mut self,
        table: TableKey,
        ndx: usize,
        column: ColumnSpec,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let data = self.table_mut(table)?;
        let count = data.spec.public_column_count();
        if ndx > count {
            return Err(TableError::ColumnDoesNotExist { ndx, count });
        }
        let instruction = column.link.is_none().then(|| Instruction::InsertColumn {
            table,
            ndx,
            name: column.name.clone(),
            data_type: column.data_type,
            nullable: column.nullable,
        });
        let default = column.default_value();
        debug!(table = %data.name, ndx, column = %column.name, "insert column");
        data.spec.insert_column(ndx, column)?;
        data.store.insert_column(ndx, &default);
        if let Some(instruction) = instruction {
            fx.record(instruction);
        }
        self.shift_columns(table, ndx, true);
        fx.reshape(table, ndx);
        Ok(())
    }

    /// Insert a link column and wire its backlink column in `target`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert_link_column(
        &mut self,
        table: TableKey,
        ndx: usize,
        name: &str,
        data_type: DataType,
        target: TableKey,
        link_type: LinkType,
        slot: BacklinkSlot,
        fx: &mut Effects,
    ) -> TableResult<()> {
        if !data_type.is_link() {
            return Err(TableError::IllegalCombination(format!(
                "{data_type} is not a link type"
            )));
        }
        if !self.has_table(target) {
            return Err(TableError::NoSuchTable(target.to_string()));
        }
        if let BacklinkSlot::At(at) = slot {
            let spec = &self.table(target)?.spec;
            // The forward column lands in front of the backlink region when
            // the link points back into its own table.
            let shift = usize::from(target == table);
            let (lo, hi) = (
                spec.public_column_count() + shift,
                spec.column_count() + shift,
            );
            if at < lo || at > hi {
                return Err(TableError::IllegalCombination(format!(
                    "backlink slot {at} outside {lo}..={hi}"
                )));
            }
        }

        self.insert_column(
            table,
            ndx,
            ColumnSpec::link(name, data_type, target, link_type),
            fx,
        )?;
        fx.record(Instruction::InsertLinkColumn {
            table,
            ndx,
            name: name.to_string(),
            data_type,
            target,
            link_type,
        });

        let target_data = self.table_mut(target)?;
        let backlink_ndx = match slot {
            BacklinkSlot::Append => target_data.spec.add_backlink_column(table, ndx),
            BacklinkSlot::At(at) => {
                target_data.spec.insert_backlink_column(at, table, ndx)?;
                at
            }
        };
        target_data
            .store
            .insert_column(backlink_ndx, &Value::BackLinks(KeyArray::new()));
        for data in self.tables_mut() {
            data.spec.shift_link_targets(target, backlink_ndx, true);
        }
        self.table_mut(table)?
            .spec
            .set_backlink_ndx(ndx, backlink_ndx)?;
        fx.reshape(target, backlink_ndx);
        Ok(())
    }

    /// Remove a public column. A link column first breaks every link it
    /// holds; orphaned strong targets are cascade-removed afterwards.
    pub(crate) fn remove_column(
        &mut self,
        table: TableKey,
        ndx: usize,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let column = self.table(table)?.check_column(ndx)?.clone();
        let mut orphans: Vec<Key> = Vec::new();

        if let Some(info) = column.link {
            let keys = self.table(table)?.store.keys();
            let mut state = CascadeState::new(CascadeMode::None);
            for key in keys {
                let targets = self.table(table)?.linked_keys(key, ndx)?;
                if targets.is_empty() {
                    continue;
                }
                *self.table_mut(table)?.cell_mut(key, ndx)? = column.default_value();
                for target in targets {
                    self.break_link(info, key, target, &mut state, fx)?;
                    orphans.push(target);
                }
            }

            let target_data = self.table_mut(info.target)?;
            target_data.spec.erase_backlink_column(info.backlink_ndx)?;
            target_data.store.erase_column(info.backlink_ndx);
            for data in self.tables_mut() {
                data.spec.shift_link_targets(info.target, info.backlink_ndx, false);
            }
            fx.reshape(info.target, info.backlink_ndx);
        }

        let data = self.table_mut(table)?;
        debug!(table = %data.name, ndx, column = %column.name, "remove column");
        data.spec.erase_column(ndx)?;
        data.store.erase_column(ndx);
        self.shift_columns(table, ndx, false);
        fx.reshape(table, ndx);
        fx.record(Instruction::RemoveColumn { table, ndx });

        if let Some(info) = column.link.filter(|l| l.link_type == LinkType::Strong) {
            orphans.sort();
            orphans.dedup();
            let mut state = CascadeState::new(CascadeMode::Strong);
            for target in orphans {
                let alive = self.table(info.target)?.store.is_valid(target);
                if alive && self.strong_referrers(info.target, target)? == 0 {
                    state.enqueue(info.target, target);
                }
            }
            self.run_cascade(&mut state, fx)?;
        }
        Ok(())
    }

    pub(crate) fn rename_column(
        &mut self,
        table: TableKey,
        ndx: usize,
        name: &str,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let data = self.table_mut(table)?;
        data.check_column(ndx)?;
        data.spec.rename_column(ndx, name)?;
        fx.reshape(table, data.spec.column_count());
        fx.record(Instruction::RenameColumn {
            table,
            ndx,
            name: name.to_string(),
        });
        Ok(())
    }

    /// Add or remove a search index. Both directions are idempotent.
    pub(crate) fn set_search_index(
        &mut self,
        table: TableKey,
        ndx: usize,
        indexed: bool,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let data = self.table_mut(table)?;
        let current = data.check_column(ndx)?.indexed;
        if !indexed && data.spec.primary_key() == Some(ndx) {
            return Err(TableError::PrimaryKeyIndex(ndx));
        }
        if current == indexed {
            return Ok(());
        }
        data.spec.set_search_index(ndx, indexed)?;
        fx.touch(table);
        fx.record(Instruction::SetSearchIndex {
            table,
            ndx,
            indexed,
        });
        Ok(())
    }

    pub(crate) fn set_primary_key(
        &mut self,
        table: TableKey,
        ndx: Option<usize>,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let data = self.table_mut(table)?;
        if let Some(ndx) = ndx {
            data.check_column(ndx)?;
        }
        data.spec.set_primary_key(ndx)?;
        fx.touch(table);
        fx.record(Instruction::SetPrimaryKey { table, ndx });
        Ok(())
    }

    /// Change link strength. Becoming strong does not cascade retroactively.
    pub(crate) fn set_link_type(
        &mut self,
        table: TableKey,
        ndx: usize,
        link_type: LinkType,
        fx: &mut Effects,
    ) -> TableResult<()> {
        self.link_column(table, ndx)?;
        let data = self.table_mut(table)?;
        let old = data.spec.set_link_type(ndx, link_type)?;
        if old != link_type {
            fx.touch(table);
            fx.record(Instruction::SetLinkType {
                table,
                ndx,
                link_type,
            });
        }
        Ok(())
    }

    /// Remove a table that no other table links to. Its own link columns
    /// are removed first, which breaks their links.
    pub(crate) fn remove_table(&mut self, table: TableKey, fx: &mut Effects) -> TableResult<()> {
        let name = self.table(table)?.name.clone();
        let linked_from_outside = self.tables().any(|other| {
            other.key != table
                && other
                    .spec
                    .columns()
                    .iter()
                    .any(|c| c.link.is_some_and(|l| l.target == table))
        });
        if linked_from_outside {
            return Err(TableError::CrossTableLinkTarget(name));
        }

        let link_columns = self.table(table)?.spec.link_columns();
        for ndx in link_columns.into_iter().rev() {
            self.remove_column(table, ndx, fx)?;
        }
        self.take_table(table);
        fx.touched.remove(&table);
        fx.record(Instruction::RemoveTable { table });
        debug!(%table, name = %name, "removed table");
        Ok(())
    }
}

//! Object removal and the strong-link cascade.
//!
//! Removal is a breadth-first closure over the strong-link subgraph. Each
//! removed object breaks its outgoing links (dropping the reciprocal
//! backlink entry first); a strong target left with no strong referrer is
//! queued for removal in turn. Incoming links to a removed object are
//! nullified (single links) or dropped (link lists), whatever their strength.
//!
//! This is plain reference counting: strong cycles with no outside owner
//! are never collected.

use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, trace};

use keel_schema::SchemaDescriptor;
use keel_types::{Key, TableKey, Value};

use crate::data::{Effects, GroupData};
use crate::error::TableResult;
use crate::replication::Instruction;

/// Whether breaking a strong link removes an orphaned target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CascadeMode {
    /// Remove only the seeded objects.
    None,
    /// Follow strong links to orphaned targets.
    Strong,
}

/// Per-operation record of removals already decided.
///
/// An object is finalized at most once per operation, even when link
/// cycles lead back to it.
#[derive(Debug)]
pub(crate) struct CascadeState {
    mode: CascadeMode,
    queue: VecDeque<(TableKey, Key)>,
    finalized: BTreeSet<(TableKey, Key)>,
}

impl CascadeState {
    pub(crate) fn new(mode: CascadeMode) -> Self {
        Self {
            mode,
            queue: VecDeque::new(),
            finalized: BTreeSet::new(),
        }
    }

    pub(crate) fn enqueue(&mut self, table: TableKey, key: Key) {
        if !self.finalized.contains(&(table, key)) {
            self.queue.push_back((table, key));
        }
    }

    pub(crate) fn cascades(&self) -> bool {
        self.mode == CascadeMode::Strong
    }

    pub(crate) fn is_finalized(&self, table: TableKey, key: Key) -> bool {
        self.finalized.contains(&(table, key))
    }

    pub(crate) fn finalized_count(&self) -> usize {
        self.finalized.len()
    }
}

impl GroupData {
    /// Drain the queue of `state`, removing each object at most once.
    pub(crate) fn run_cascade(
        &mut self,
        state: &mut CascadeState,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let mut rounds = 0usize;
        while let Some((table, key)) = state.queue.pop_front() {
            if state.is_finalized(table, key) || !self.table(table)?.store.is_valid(key) {
                continue;
            }
            rounds += 1;
            trace!(%table, %key, "removing object");

            self.break_outgoing(table, key, state, fx)?;
            self.nullify_incoming(table, key, fx)?;

            let strict = self.config.strict_key_reuse;
            let data = self.table_mut(table)?;
            data.store.erase(key)?;
            if strict {
                data.retire(key);
            }
            state.finalized.insert((table, key));
            fx.touch(table);
            fx.removed.push((table, key));
            fx.record(Instruction::RemoveObject { table, key });
        }
        if rounds > 1 {
            debug!(removed = rounds, "cascade finished");
        }
        Ok(())
    }

    /// Break every forward link held by `key`, resetting its link cells.
    fn break_outgoing(
        &mut self,
        table: TableKey,
        key: Key,
        state: &mut CascadeState,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let data = self.table(table)?;
        let mut outgoing = Vec::new();
        for ndx in data.spec.link_columns() {
            let targets = data.linked_keys(key, ndx)?;
            if !targets.is_empty() {
                outgoing.push((ndx, targets));
            }
        }

        for (ndx, targets) in outgoing {
            let info = self.link_column(table, ndx)?.1;
            let default = self.table(table)?.check_column(ndx)?.default_value();
            *self.table_mut(table)?.cell_mut(key, ndx)? = default;
            for target in targets {
                self.break_link(info, key, target, state, fx)?;
            }
        }
        Ok(())
    }

    /// Nullify single links and drop list entries that point at `key`.
    fn nullify_incoming(
        &mut self,
        table: TableKey,
        key: Key,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let data = self.table(table)?;
        let mut incoming = Vec::new();
        for ndx in data.spec.backlink_columns() {
            let Some(back) = data.spec.column(ndx).and_then(|c| c.backlink) else {
                continue;
            };
            let mut origins = data.linked_keys(key, ndx)?;
            origins.sort();
            origins.dedup();
            if !origins.is_empty() {
                incoming.push((ndx, back, origins));
            }
        }

        for (ndx, back, origins) in incoming {
            let origin_table = self.table_mut(back.origin)?;
            for origin_key in origins {
                let cell = origin_table.cell_mut(origin_key, back.origin_ndx)?;
                match cell {
                    Value::Link(_) => *cell = Value::Null,
                    Value::LinkList(keys) => {
                        while let Some(pos) = keys.find_first(key, 0, keys.len()) {
                            keys.erase(pos);
                        }
                    }
                    _ => {}
                }
            }
            fx.touch(back.origin);
            if let Some(keys) = self.table_mut(table)?.cell_mut(key, ndx)?.as_keys_mut() {
                keys.clear();
            }
        }
        Ok(())
    }

    /// Remove exactly one object. Its links are broken without cascading.
    pub(crate) fn remove_object(
        &mut self,
        table: TableKey,
        key: Key,
        fx: &mut Effects,
    ) -> TableResult<()> {
        self.table(table)?.check_object(key)?;
        let mut state = CascadeState::new(CascadeMode::None);
        state.enqueue(table, key);
        self.run_cascade(&mut state, fx)
    }

    /// Remove an object and every object that loses its last strong
    /// referrer as a result. Returns the number of objects removed.
    pub(crate) fn remove_object_recursive(
        &mut self,
        table: TableKey,
        key: Key,
        fx: &mut Effects,
    ) -> TableResult<usize> {
        self.table(table)?.check_object(key)?;
        let mut state = CascadeState::new(CascadeMode::Strong);
        state.enqueue(table, key);
        self.run_cascade(&mut state, fx)?;
        Ok(state.finalized_count())
    }

    /// Remove every object, one recursive removal at a time.
    pub(crate) fn clear(&mut self, table: TableKey, fx: &mut Effects) -> TableResult<()> {
        let keys = self.table(table)?.store.keys();
        debug!(%table, objects = keys.len(), "clearing table");
        for key in keys {
            if self.table(table)?.store.is_valid(key) {
                self.remove_object_recursive(table, key, fx)?;
            }
        }
        fx.touch(table);
        Ok(())
    }
}

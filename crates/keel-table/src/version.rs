//! Version propagation across the link graph.
//!
//! A mutation bumps the global counter once, then every touched table
//! catches up to it. A table that catches up passes the bump on to every
//! table on the far side of its link and backlink columns. Tables already
//! carrying the current global version are left alone, which ends the walk
//! on cyclic link graphs; the per-pass visited set guards against contexts
//! whose policy never says no.

use std::collections::BTreeSet;

use tracing::trace;

use keel_types::TableKey;

use crate::context::TransactionContext;
use crate::data::GroupData;

/// Bump the global version, then propagate from each of `touched`.
pub(crate) fn propagate(
    data: &mut GroupData,
    context: &dyn TransactionContext,
    touched: &BTreeSet<TableKey>,
) {
    if touched.is_empty() {
        return;
    }
    context.bump_global_version();

    let mut visited = BTreeSet::new();
    let mut pending: Vec<TableKey> = touched.iter().rev().copied().collect();
    while let Some(key) = pending.pop() {
        if !visited.insert(key) {
            continue;
        }
        let Ok(table) = data.table_mut(key) else {
            continue;
        };
        if !context.should_propagate_version(&mut table.version) {
            continue;
        }
        trace!(table = %key, version = table.version, "version bumped");
        for neighbor in table.linked_tables() {
            if !visited.contains(&neighbor) {
                pending.push(neighbor);
            }
        }
    }
}

//! Forward links and their reciprocal backlinks.
//!
//! Every forward link `(origin key, origin column) -> target key` has
//! exactly one matching entry in the target's backlink column for that
//! origin column. All writes to link cells go through this module so the
//! two sides never drift apart.

use keel_schema::LinkInfo;
use keel_types::{DataType, Key, KeyArray, LinkType, TableKey, Value};

use crate::cascade::{CascadeMode, CascadeState};
use crate::data::{Effects, GroupData};
use crate::error::{TableError, TableResult};
use crate::replication::Instruction;

impl GroupData {
    /// Type and link descriptor of public column `ndx`.
    pub(crate) fn link_column(
        &self,
        table: TableKey,
        ndx: usize,
    ) -> TableResult<(DataType, LinkInfo)> {
        let column = self.table(table)?.check_column(ndx)?;
        let info = column.link.ok_or(TableError::NotALinkColumn(ndx))?;
        Ok((column.data_type, info))
    }

    fn expect_link_type(
        &self,
        table: TableKey,
        ndx: usize,
        expected: DataType,
    ) -> TableResult<LinkInfo> {
        let (actual, info) = self.link_column(table, ndx)?;
        if actual != expected {
            return Err(TableError::TypeMismatch {
                ndx,
                expected,
                actual,
            });
        }
        Ok(info)
    }

    fn add_backlink(&mut self, info: LinkInfo, origin_key: Key, target: Key) -> TableResult<()> {
        let cell = self.table_mut(info.target)?.cell_mut(target, info.backlink_ndx)?;
        if let Some(keys) = cell.as_keys_mut() {
            keys.add(origin_key);
        }
        Ok(())
    }

    /// Drop exactly one backlink entry. A missing entry means the two sides
    /// drifted apart, which is a bug, so this panics.
    fn remove_backlink(&mut self, info: LinkInfo, origin_key: Key, target: Key) -> TableResult<()> {
        let cell = self.table_mut(info.target)?.cell_mut(target, info.backlink_ndx)?;
        if let Some(keys) = cell.as_keys_mut() {
            keys.nullify(origin_key);
        }
        Ok(())
    }

    /// Break one link: drop its backlink entry, then queue the target if it
    /// was strongly owned and has no strong referrer left.
    pub(crate) fn break_link(
        &mut self,
        info: LinkInfo,
        origin_key: Key,
        target: Key,
        state: &mut CascadeState,
        fx: &mut Effects,
    ) -> TableResult<()> {
        self.remove_backlink(info, origin_key, target)?;
        fx.touch(info.target);
        if info.link_type == LinkType::Strong
            && state.cascades()
            && self.strong_referrers(info.target, target)? == 0
        {
            state.enqueue(info.target, target);
        }
        Ok(())
    }

    /// Wire a new link, checking that the target exists.
    fn make_link(
        &mut self,
        info: LinkInfo,
        origin_key: Key,
        target: Key,
        fx: &mut Effects,
    ) -> TableResult<()> {
        self.table(info.target)?.check_object(target)?;
        self.add_backlink(info, origin_key, target)?;
        fx.touch(info.target);
        Ok(())
    }

    fn list_mut(&mut self, table: TableKey, key: Key, ndx: usize) -> TableResult<&mut KeyArray> {
        let cell = self.table_mut(table)?.cell_mut(key, ndx)?;
        match cell {
            Value::LinkList(keys) => Ok(keys),
            other => Err(TableError::TypeMismatch {
                ndx,
                expected: DataType::LinkList,
                actual: other.data_type().unwrap_or(DataType::Link),
            }),
        }
    }

    fn checked_list_len(&self, table: TableKey, key: Key, ndx: usize) -> TableResult<usize> {
        self.table(table)?.check_object(key)?;
        Ok(self.table(table)?.linked_keys(key, ndx)?.len())
    }

    /// Point a single-link cell at `target`, or clear it with `None`.
    ///
    /// Setting the current target again is not a break and does nothing.
    pub(crate) fn set_link(
        &mut self,
        table: TableKey,
        ndx: usize,
        key: Key,
        target: Option<Key>,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let info = self.expect_link_type(table, ndx, DataType::Link)?;
        let old = self.table(table)?.cell(key, ndx)?.as_link();
        if old == target {
            return Ok(());
        }

        if let Some(new) = target {
            self.make_link(info, key, new, fx)?;
        }
        *self.table_mut(table)?.cell_mut(key, ndx)? = target.map_or(Value::Null, Value::Link);
        fx.touch(table);
        fx.record(Instruction::Set {
            table,
            key,
            ndx,
            value: target.map_or(Value::Null, Value::Link),
        });

        if let Some(old) = old {
            let mut state = CascadeState::new(CascadeMode::Strong);
            self.break_link(info, key, old, &mut state, fx)?;
            self.run_cascade(&mut state, fx)?;
        }
        Ok(())
    }

    pub(crate) fn list_insert(
        &mut self,
        table: TableKey,
        ndx: usize,
        key: Key,
        pos: usize,
        target: Key,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let info = self.expect_link_type(table, ndx, DataType::LinkList)?;
        let size = self.checked_list_len(table, key, ndx)?;
        if pos > size {
            return Err(TableError::IndexOutOfBounds { ndx: pos, size });
        }
        self.make_link(info, key, target, fx)?;
        self.list_mut(table, key, ndx)?.insert(pos, target);
        fx.touch(table);
        fx.record(Instruction::ListInsert {
            table,
            key,
            ndx,
            pos,
            target,
        });
        Ok(())
    }

    /// Replace the entry at `pos`, returning the previous target.
    pub(crate) fn list_set(
        &mut self,
        table: TableKey,
        ndx: usize,
        key: Key,
        pos: usize,
        target: Key,
        fx: &mut Effects,
    ) -> TableResult<Key> {
        let info = self.expect_link_type(table, ndx, DataType::LinkList)?;
        let size = self.checked_list_len(table, key, ndx)?;
        let old = self
            .list_mut(table, key, ndx)?
            .get(pos)
            .ok_or(TableError::IndexOutOfBounds { ndx: pos, size })?;
        if old == target {
            return Ok(old);
        }

        self.make_link(info, key, target, fx)?;
        self.list_mut(table, key, ndx)?.set(pos, target);
        fx.touch(table);
        fx.record(Instruction::ListSet {
            table,
            key,
            ndx,
            pos,
            target,
        });

        let mut state = CascadeState::new(CascadeMode::Strong);
        self.break_link(info, key, old, &mut state, fx)?;
        self.run_cascade(&mut state, fx)?;
        Ok(old)
    }

    /// Remove the entry at `pos`, returning its target.
    pub(crate) fn list_erase(
        &mut self,
        table: TableKey,
        ndx: usize,
        key: Key,
        pos: usize,
        fx: &mut Effects,
    ) -> TableResult<Key> {
        let info = self.expect_link_type(table, ndx, DataType::LinkList)?;
        let size = self.checked_list_len(table, key, ndx)?;
        if pos >= size {
            return Err(TableError::IndexOutOfBounds { ndx: pos, size });
        }
        let old = self
            .list_mut(table, key, ndx)?
            .erase(pos)
            .ok_or(TableError::IndexOutOfBounds { ndx: pos, size })?;
        fx.touch(table);
        fx.record(Instruction::ListErase {
            table,
            key,
            ndx,
            pos,
        });

        let mut state = CascadeState::new(CascadeMode::Strong);
        self.break_link(info, key, old, &mut state, fx)?;
        self.run_cascade(&mut state, fx)?;
        Ok(old)
    }

    pub(crate) fn list_clear(
        &mut self,
        table: TableKey,
        ndx: usize,
        key: Key,
        fx: &mut Effects,
    ) -> TableResult<()> {
        let info = self.expect_link_type(table, ndx, DataType::LinkList)?;
        self.table(table)?.check_object(key)?;
        let old: Vec<Key> = {
            let list = self.list_mut(table, key, ndx)?;
            let old = list.keys().collect();
            list.clear();
            old
        };
        if old.is_empty() {
            return Ok(());
        }
        fx.touch(table);
        fx.record(Instruction::ListClear { table, key, ndx });

        let mut state = CascadeState::new(CascadeMode::Strong);
        for target in old {
            self.break_link(info, key, target, &mut state, fx)?;
        }
        self.run_cascade(&mut state, fx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupConfig;
    use crate::schema::BacklinkSlot;
    use keel_schema::SchemaDescriptor;

    struct Fixture {
        data: GroupData,
        origin: TableKey,
        target: TableKey,
    }

    impl Fixture {
        fn new(link_type: LinkType) -> Self {
            let mut data = GroupData::new(GroupConfig::default());
            let mut fx = Effects::default();
            let origin = data.add_table("origin").unwrap();
            let target = data.add_table("target").unwrap();
            for (ndx, name, ty) in [(0, "one", DataType::Link), (1, "many", DataType::LinkList)] {
                data.insert_link_column(
                    origin,
                    ndx,
                    name,
                    ty,
                    target,
                    link_type,
                    BacklinkSlot::Append,
                    &mut fx,
                )
                .unwrap();
            }
            Self {
                data,
                origin,
                target,
            }
        }

        fn create(&mut self, table: TableKey) -> Key {
            self.data
                .create_object(table, None, &mut Effects::default())
                .unwrap()
        }

        fn backlinks(&self, key: Key, origin_ndx: usize) -> Vec<Key> {
            let target = self.data.table(self.target).unwrap();
            let back = target
                .spec
                .find_backlink_column(self.origin, origin_ndx)
                .unwrap();
            target.linked_keys(key, back).unwrap()
        }

        fn alive(&self, table: TableKey, key: Key) -> bool {
            self.data.table(table).unwrap().store.is_valid(key)
        }
    }

    // -----------------------------------------------------------------------
    // Single links
    // -----------------------------------------------------------------------

    #[test]
    fn set_link_maintains_backlink() {
        let mut f = Fixture::new(LinkType::Weak);
        let a = f.create(f.origin);
        let b = f.create(f.target);
        let c = f.create(f.target);
        let mut fx = Effects::default();

        f.data.set_link(f.origin, 0, a, Some(b), &mut fx).unwrap();
        assert_eq!(f.backlinks(b, 0), vec![a]);

        f.data.set_link(f.origin, 0, a, Some(c), &mut fx).unwrap();
        assert!(f.backlinks(b, 0).is_empty());
        assert_eq!(f.backlinks(c, 0), vec![a]);

        f.data.set_link(f.origin, 0, a, None, &mut fx).unwrap();
        assert!(f.backlinks(c, 0).is_empty());
        assert!(f.alive(f.target, b) && f.alive(f.target, c));
    }

    #[test]
    fn overwriting_strong_link_cascades() {
        let mut f = Fixture::new(LinkType::Strong);
        let a = f.create(f.origin);
        let b = f.create(f.target);
        let c = f.create(f.target);
        let mut fx = Effects::default();
        f.data.set_link(f.origin, 0, a, Some(b), &mut fx).unwrap();
        f.data.set_link(f.origin, 0, a, Some(c), &mut fx).unwrap();
        assert!(!f.alive(f.target, b));
        assert!(f.alive(f.target, c));
    }

    #[test]
    fn same_target_is_not_a_break() {
        let mut f = Fixture::new(LinkType::Strong);
        let a = f.create(f.origin);
        let b = f.create(f.target);
        let mut fx = Effects::default();
        f.data.set_link(f.origin, 0, a, Some(b), &mut fx).unwrap();

        let mut again = Effects::default();
        f.data.set_link(f.origin, 0, a, Some(b), &mut again).unwrap();
        assert!(f.alive(f.target, b));
        assert_eq!(f.backlinks(b, 0), vec![a]);
        assert!(again.touched.is_empty());
    }

    #[test]
    fn missing_target_rejected() {
        let mut f = Fixture::new(LinkType::Weak);
        let a = f.create(f.origin);
        let missing = Key::new(99).unwrap();
        assert!(matches!(
            f.data.set_link(f.origin, 0, a, Some(missing), &mut Effects::default()),
            Err(TableError::NoSuchObject(_))
        ));
        assert_eq!(f.data.table(f.origin).unwrap().cell(a, 0).unwrap(), &Value::Null);
    }

    #[test]
    fn link_ops_check_column_kind() {
        let mut f = Fixture::new(LinkType::Weak);
        let a = f.create(f.origin);
        let b = f.create(f.target);
        let mut fx = Effects::default();
        assert!(matches!(
            f.data.set_link(f.origin, 1, a, Some(b), &mut fx),
            Err(TableError::TypeMismatch { .. })
        ));
        assert!(matches!(
            f.data.list_insert(f.origin, 0, a, 0, b, &mut fx),
            Err(TableError::TypeMismatch { .. })
        ));
        assert!(matches!(
            f.data.set_link(f.origin, 5, a, Some(b), &mut fx),
            Err(TableError::ColumnDoesNotExist { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Link lists
    // -----------------------------------------------------------------------

    #[test]
    fn list_break_removes_exactly_one_backlink() {
        let mut f = Fixture::new(LinkType::Weak);
        let a = f.create(f.origin);
        let b = f.create(f.target);
        let c = f.create(f.target);
        let mut fx = Effects::default();
        for (pos, t) in [b, c, b].into_iter().enumerate() {
            f.data.list_insert(f.origin, 1, a, pos, t, &mut fx).unwrap();
        }
        assert_eq!(f.backlinks(b, 1).len(), 2);

        assert_eq!(f.data.list_erase(f.origin, 1, a, 0, &mut fx).unwrap(), b);
        assert_eq!(f.backlinks(b, 1).len(), 1);
        assert_eq!(f.backlinks(c, 1).len(), 1);
    }

    #[test]
    fn list_set_swaps_backlinks() {
        let mut f = Fixture::new(LinkType::Strong);
        let a = f.create(f.origin);
        let b = f.create(f.target);
        let c = f.create(f.target);
        let mut fx = Effects::default();
        f.data.list_insert(f.origin, 1, a, 0, b, &mut fx).unwrap();
        assert_eq!(f.data.list_set(f.origin, 1, a, 0, c, &mut fx).unwrap(), b);
        assert!(!f.alive(f.target, b));
        assert_eq!(f.backlinks(c, 1), vec![a]);
    }

    #[test]
    fn list_bounds() {
        let mut f = Fixture::new(LinkType::Weak);
        let a = f.create(f.origin);
        let b = f.create(f.target);
        let mut fx = Effects::default();
        assert!(matches!(
            f.data.list_insert(f.origin, 1, a, 1, b, &mut fx),
            Err(TableError::IndexOutOfBounds { ndx: 1, size: 0 })
        ));
        assert!(matches!(
            f.data.list_erase(f.origin, 1, a, 0, &mut fx),
            Err(TableError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn list_clear_cascades_strong_targets() {
        let mut f = Fixture::new(LinkType::Strong);
        let a = f.create(f.origin);
        let b = f.create(f.target);
        let c = f.create(f.target);
        let mut fx = Effects::default();
        f.data.list_insert(f.origin, 1, a, 0, b, &mut fx).unwrap();
        f.data.list_insert(f.origin, 1, a, 1, c, &mut fx).unwrap();
        f.data.list_clear(f.origin, 1, a, &mut fx).unwrap();
        assert_eq!(f.data.table(f.target).unwrap().store.len(), 0);
        assert!(f.alive(f.origin, a));
    }
}

//! [`LinkList`]: a handle to the link-list cell of one object.

use std::fmt;

use keel_types::{DataType, Key};

use crate::error::{TableError, TableResult};
use crate::registry::{HandleKind, Ticket};
use crate::table::TableRef;

/// An ordered list of links held by one object.
///
/// The handle is detached when its object is removed, when a column is
/// inserted or removed in front of its column, and when the table is
/// detached.
pub struct LinkList {
    origin: TableRef,
    key: Key,
    ndx: usize,
    ticket: Ticket,
}

impl LinkList {
    pub(crate) fn new(origin: TableRef, key: Key, ndx: usize) -> TableResult<Self> {
        let actual = origin.get_column_type(ndx)?;
        if actual != DataType::LinkList {
            return Err(TableError::TypeMismatch {
                ndx,
                expected: DataType::LinkList,
                actual,
            });
        }
        origin.read(|t| t.check_object(key))?;
        let ticket = origin
            .accessor()
            .registry
            .lock()
            .register(HandleKind::LinkList { key, ndx });
        Ok(Self {
            origin,
            key,
            ndx,
            ticket,
        })
    }

    pub fn is_attached(&self) -> bool {
        self.origin.is_attached() && self.origin.accessor().registry.lock().is_valid(self.ticket)
    }

    fn check(&self) -> TableResult<()> {
        if self.is_attached() {
            Ok(())
        } else {
            Err(TableError::Detached)
        }
    }

    /// Key of the object holding the list.
    pub fn owner(&self) -> Key {
        self.key
    }

    /// The table the list links into.
    pub fn get_target_table(&self) -> TableResult<TableRef> {
        self.check()?;
        self.origin.get_link_target(self.ndx)
    }

    pub fn keys(&self) -> TableResult<Vec<Key>> {
        self.check()?;
        self.origin.read(|t| t.linked_keys(self.key, self.ndx))
    }

    pub fn size(&self) -> TableResult<usize> {
        Ok(self.keys()?.len())
    }

    pub fn is_empty(&self) -> TableResult<bool> {
        Ok(self.size()? == 0)
    }

    pub fn get(&self, pos: usize) -> TableResult<Key> {
        let keys = self.keys()?;
        keys.get(pos).copied().ok_or(TableError::IndexOutOfBounds {
            ndx: pos,
            size: keys.len(),
        })
    }

    /// Position of the first entry linking to `target`.
    pub fn find_first(&self, target: Key) -> TableResult<Option<usize>> {
        Ok(self.keys()?.iter().position(|k| *k == target))
    }

    pub fn add(&self, target: Key) -> TableResult<()> {
        let size = self.size()?;
        self.insert(size, target)
    }

    pub fn insert(&self, pos: usize, target: Key) -> TableResult<()> {
        self.check()?;
        let (key, ndx) = (self.key, self.ndx);
        self.origin
            .mutate(|data, table, fx| data.list_insert(table, ndx, key, pos, target, fx))
    }

    /// Replace the entry at `pos`, returning the previous target. A strong
    /// target left without referrers is removed.
    pub fn set(&self, pos: usize, target: Key) -> TableResult<Key> {
        self.check()?;
        let (key, ndx) = (self.key, self.ndx);
        self.origin
            .mutate(|data, table, fx| data.list_set(table, ndx, key, pos, target, fx))
    }

    /// Remove the entry at `pos`, returning its target.
    pub fn remove(&self, pos: usize) -> TableResult<Key> {
        self.check()?;
        let (key, ndx) = (self.key, self.ndx);
        self.origin
            .mutate(|data, table, fx| data.list_erase(table, ndx, key, pos, fx))
    }

    pub fn clear(&self) -> TableResult<()> {
        self.check()?;
        let (key, ndx) = (self.key, self.ndx);
        self.origin
            .mutate(|data, table, fx| data.list_clear(table, ndx, key, fx))
    }
}

impl Drop for LinkList {
    fn drop(&mut self) {
        self.origin.accessor().registry.lock().unregister(self.ticket);
    }
}

impl fmt::Debug for LinkList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkList")
            .field("table", &self.origin.get_key())
            .field("key", &self.key)
            .field("column", &self.ndx)
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupConfig;
    use crate::Group;
    use keel_types::LinkType;

    fn setup(strength: LinkType) -> (Group, TableRef, TableRef, LinkList, Vec<Key>) {
        let group = Group::new(GroupConfig::default());
        let owner = group.add_table("owner").unwrap();
        let item = group.add_table("item").unwrap();
        owner.add_column_list("items", &item, strength).unwrap();
        let items = item.create_objects(3).unwrap();
        let list = owner.create_object().unwrap().get_linklist(0).unwrap();
        (group, owner, item, list, items)
    }

    #[test]
    fn positional_operations() {
        let (_g, _owner, item, list, items) = setup(LinkType::Weak);
        list.add(items[0]).unwrap();
        list.add(items[2]).unwrap();
        list.insert(1, items[1]).unwrap();
        assert_eq!(list.keys().unwrap(), items);
        assert_eq!(list.find_first(items[2]).unwrap(), Some(2));
        assert_eq!(list.get_target_table().unwrap(), item);

        assert_eq!(list.set(0, items[2]).unwrap(), items[0]);
        assert_eq!(list.remove(1).unwrap(), items[1]);
        assert_eq!(list.keys().unwrap(), vec![items[2], items[2]]);
        assert_eq!(item.size().unwrap(), 3);

        assert!(matches!(
            list.get(5),
            Err(TableError::IndexOutOfBounds { ndx: 5, size: 2 })
        ));
        assert!(matches!(
            list.insert(9, items[0]),
            Err(TableError::IndexOutOfBounds { ndx: 9, size: 2 })
        ));
        assert!(matches!(
            list.remove(2),
            Err(TableError::IndexOutOfBounds { ndx: 2, size: 2 })
        ));
        list.clear().unwrap();
        assert!(list.is_empty().unwrap());
    }

    #[test]
    fn strong_entries_cascade_when_dropped() {
        let (_g, _owner, item, list, items) = setup(LinkType::Strong);
        list.add(items[0]).unwrap();
        list.add(items[0]).unwrap();
        list.add(items[1]).unwrap();

        list.remove(0).unwrap();
        assert!(item.is_valid(items[0]));
        list.remove(0).unwrap();
        assert!(!item.is_valid(items[0]));

        list.clear().unwrap();
        assert!(!item.is_valid(items[1]));
        assert!(item.is_valid(items[2]));
    }

    #[test]
    fn links_to_missing_objects_rejected() {
        let (_g, _owner, item, list, items) = setup(LinkType::Weak);
        item.remove_object(items[0]).unwrap();
        assert!(matches!(
            list.add(items[0]),
            Err(TableError::NoSuchObject(_))
        ));
        assert!(list.is_empty().unwrap());
    }

    #[test]
    fn list_detaches_on_owner_removal_and_column_shift() {
        let (_g, owner, _item, list, items) = setup(LinkType::Weak);
        list.add(items[0]).unwrap();
        owner.insert_column(0, DataType::Int, "n", false).unwrap();
        assert!(!list.is_attached());
        assert!(matches!(list.size(), Err(TableError::Detached)));

        let key = list.owner();
        let moved = owner.get_object(key).unwrap().get_linklist(1).unwrap();
        assert_eq!(moved.keys().unwrap(), vec![items[0]]);
        owner.remove_object(key).unwrap();
        assert!(!moved.is_attached());
    }

    #[test]
    fn only_link_list_columns() {
        let group = Group::new(GroupConfig::default());
        let t = group.add_table("t").unwrap();
        t.add_column(DataType::Int, "n", false).unwrap();
        let obj = t.create_object().unwrap();
        assert!(matches!(
            obj.get_linklist(0),
            Err(TableError::TypeMismatch {
                expected: DataType::LinkList,
                ..
            })
        ));
    }
}

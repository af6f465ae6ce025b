//! Table accessors: reference counting, attachment, and refresh.
//!
//! A [`TableAccessor`] is the shared state behind every
//! [`TableRef`](crate::TableRef). Group-level accessors are cached by their
//! group and leave the cache when the last handle goes away. The count is
//! kept by hand rather than read off the `Arc`: the thread that takes it to
//! zero must re-check it under the group's accessor lock, because another
//! thread may have fetched the accessor from the cache in between.
//!
//! Each accessor also caches its column layout. Link columns remember the
//! accessor of their target table and backlink columns the accessor of
//! their origin. Schema changes mark the layout dirty; it is rebuilt on the
//! next use or by [`Group::advance_read`](crate::Group::advance_read).

use std::collections::HashMap;
use std::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use keel_schema::SchemaDescriptor;
use keel_types::{DataType, TableKey};

use crate::data::TableData;
use crate::error::{TableError, TableResult};
use crate::group::GroupShared;
use crate::registry::AccessorRegistry;

/// Where an accessor's data lives.
#[derive(Debug)]
pub(crate) enum HomeLink {
    /// A table inside a group. Does not keep the group alive.
    Parent(Weak<GroupShared>),
    /// The only table of a freestanding accessor.
    Owned(Arc<GroupShared>),
}

/// What a column is wired to.
#[derive(Clone, Debug)]
pub(crate) enum Binding {
    Plain,
    Link {
        target: TableKey,
        accessor: Weak<TableAccessor>,
    },
    Backlink {
        origin: TableKey,
        origin_ndx: usize,
        accessor: Weak<TableAccessor>,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct ColumnAccessor {
    pub(crate) data_type: DataType,
    pub(crate) nullable: bool,
    pub(crate) binding: Binding,
}

#[derive(Debug, Default)]
struct Layout {
    public: usize,
    columns: Vec<ColumnAccessor>,
}

#[derive(Debug)]
pub(crate) struct TableAccessor {
    pub(crate) key: TableKey,
    home: HomeLink,
    ref_count: AtomicUsize,
    attached: AtomicBool,
    dirty: AtomicBool,
    layout: Mutex<Layout>,
    pub(crate) registry: Mutex<AccessorRegistry>,
}

impl TableAccessor {
    /// A fresh accessor with no references. Its layout is built on first use.
    pub(crate) fn new(key: TableKey, home: HomeLink) -> Self {
        Self {
            key,
            home,
            ref_count: AtomicUsize::new(0),
            attached: AtomicBool::new(true),
            dirty: AtomicBool::new(true),
            layout: Mutex::new(Layout::default()),
            registry: Mutex::new(AccessorRegistry::new()),
        }
    }

    /// The shared state this accessor reads and writes through.
    pub(crate) fn shared(&self) -> TableResult<Arc<GroupShared>> {
        if !self.attached.load(Ordering::Acquire) {
            return Err(TableError::Detached);
        }
        match &self.home {
            HomeLink::Parent(parent) => parent.upgrade().ok_or(TableError::Detached),
            HomeLink::Owned(shared) => Ok(Arc::clone(shared)),
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.shared().is_ok()
    }

    pub(crate) fn is_group_level(&self) -> bool {
        matches!(self.home, HomeLink::Parent(_))
    }

    // ---- Reference counting ----

    pub(crate) fn bind(&self) {
        self.ref_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Drop one reference. Whoever takes the count to zero tears the
    /// accessor down; with a live parent that happens under the parent's
    /// accessor lock, after checking the count again.
    pub(crate) fn unbind(self: &Arc<Self>) {
        if self.ref_count.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        fence(Ordering::Acquire);
        let parent = match &self.home {
            HomeLink::Parent(parent) => parent.upgrade(),
            HomeLink::Owned(_) => None,
        };
        match parent {
            Some(shared) => shared.release(self),
            None => self.teardown(),
        }
    }

    pub(crate) fn teardown(&self) {
        let invalidated = self.detach();
        debug!(table = %self.key, invalidated, "accessor torn down");
    }

    /// Mark the accessor detached and invalidate every handle bound to it.
    /// Returns how many handles were still valid.
    pub(crate) fn detach(&self) -> usize {
        self.attached.store(false, Ordering::Release);
        *self.layout.lock() = Layout::default();
        self.registry.lock().invalidate_all()
    }

    // ---- Refresh ----

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_fresh(self: &Arc<Self>, shared: &GroupShared) {
        if self.is_dirty() {
            self.refresh(shared);
        }
    }

    /// Rebuild the column layout in column order. Link columns re-resolve
    /// their target accessor, and the matching backlink column on the far
    /// side is pointed back at this accessor.
    pub(crate) fn refresh(self: &Arc<Self>, shared: &GroupShared) {
        let guard = shared.accessors.lock();
        let mut relink = Vec::new();
        let layout = {
            let data = shared.data.lock();
            let cache = guard.borrow();
            let built = data
                .table(self.key)
                .ok()
                .map(|table| build_layout(table, &cache, &mut relink));
            built
        };
        let Some(layout) = layout else {
            drop(guard);
            self.detach();
            return;
        };

        let count = layout.columns.len();
        *self.layout.lock() = layout;
        for (target, backlink_ndx) in relink {
            target.relink_backlink(backlink_ndx, self);
        }
        self.dirty.store(false, Ordering::Release);
        drop(guard);
        trace!(table = %self.key, columns = count, "accessor refreshed");
    }

    fn relink_backlink(&self, ndx: usize, origin: &Arc<TableAccessor>) {
        let mut layout = self.layout.lock();
        if let Some(ColumnAccessor {
            binding: Binding::Backlink { accessor, .. },
            ..
        }) = layout.columns.get_mut(ndx)
        {
            *accessor = Arc::downgrade(origin);
        }
    }

    // ---- Layout queries ----

    pub(crate) fn public_column_count(&self) -> usize {
        self.layout.lock().public
    }

    /// Cached descriptor of public column `ndx`.
    pub(crate) fn column(&self, ndx: usize) -> TableResult<ColumnAccessor> {
        let layout = self.layout.lock();
        if ndx >= layout.public {
            return Err(TableError::ColumnDoesNotExist {
                ndx,
                count: layout.public,
            });
        }
        layout
            .columns
            .get(ndx)
            .cloned()
            .ok_or(TableError::ColumnDoesNotExist {
                ndx,
                count: layout.public,
            })
    }

    /// Target table of link column `ndx`, with the cached target accessor.
    pub(crate) fn link_target(&self, ndx: usize) -> TableResult<(TableKey, Weak<TableAccessor>)> {
        match self.column(ndx)?.binding {
            Binding::Link { target, accessor } => Ok((target, accessor)),
            _ => Err(TableError::NotALinkColumn(ndx)),
        }
    }

    /// Index of the backlink column mirroring `origin_ndx` in `origin`.
    pub(crate) fn find_backlink(&self, origin: TableKey, origin_ndx: usize) -> Option<usize> {
        let layout = self.layout.lock();
        layout
            .columns
            .iter()
            .enumerate()
            .skip(layout.public)
            .find_map(|(ndx, col)| match col.binding {
                Binding::Backlink {
                    origin: o,
                    origin_ndx: n,
                    ..
                } if o == origin && n == origin_ndx => Some(ndx),
                _ => None,
            })
    }

    /// Origin table of backlink column `ndx`, with the cached origin
    /// accessor.
    pub(crate) fn backlink_origin(
        &self,
        ndx: usize,
    ) -> TableResult<(TableKey, Weak<TableAccessor>)> {
        let layout = self.layout.lock();
        match layout.columns.get(ndx).map(|col| &col.binding) {
            Some(Binding::Backlink {
                origin, accessor, ..
            }) if ndx >= layout.public => Ok((*origin, accessor.clone())),
            _ => Err(TableError::ColumnDoesNotExist {
                ndx,
                count: layout.columns.len(),
            }),
        }
    }
}

fn build_layout(
    table: &TableData,
    cache: &HashMap<TableKey, Arc<TableAccessor>>,
    relink: &mut Vec<(Arc<TableAccessor>, usize)>,
) -> Layout {
    let lookup = |key: TableKey| cache.get(&key).map(Arc::downgrade).unwrap_or_default();
    let columns = table
        .spec
        .columns()
        .iter()
        .map(|column| {
            let binding = if let Some(link) = column.link {
                if let Some(target) = cache.get(&link.target) {
                    relink.push((Arc::clone(target), link.backlink_ndx));
                }
                Binding::Link {
                    target: link.target,
                    accessor: lookup(link.target),
                }
            } else if let Some(back) = column.backlink {
                Binding::Backlink {
                    origin: back.origin,
                    origin_ndx: back.origin_ndx,
                    accessor: lookup(back.origin),
                }
            } else {
                Binding::Plain
            };
            ColumnAccessor {
                data_type: column.data_type,
                nullable: column.nullable,
                binding,
            }
        })
        .collect();
    Layout {
        public: table.spec.public_column_count(),
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupConfig;
    use crate::Group;
    use keel_types::LinkType;

    // -----------------------------------------------------------------------
    // Reference counting
    // -----------------------------------------------------------------------

    #[test]
    fn last_unbind_without_parent_tears_down() {
        let shared = Arc::new(GroupShared::freestanding(GroupConfig::default()).0);
        let acc = Arc::new(TableAccessor::new(TableKey::new(0), HomeLink::Owned(shared)));
        acc.bind();
        acc.bind();
        acc.unbind();
        assert!(acc.is_attached());
        acc.unbind();
        assert!(!acc.is_attached());
        assert_eq!(acc.ref_count(), 0);
    }

    #[test]
    fn dead_parent_means_detached() {
        let group = Group::new(GroupConfig::default());
        let table = group.add_table("t").unwrap();
        let acc = Arc::clone(table.accessor());
        drop(group);
        assert!(!acc.is_attached());
        assert!(matches!(acc.shared(), Err(TableError::Detached)));
    }

    // -----------------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------------

    #[test]
    fn refresh_resolves_both_ends_of_a_link() {
        let group = Group::new(GroupConfig::default());
        let person = group.add_table("person").unwrap();
        let dog = group.add_table("dog").unwrap();
        person.add_column(DataType::String, "name", false).unwrap();
        person
            .add_column_link(DataType::Link, "pet", &dog, LinkType::Weak)
            .unwrap();
        group.advance_read();

        let (target, hint) = person.accessor().link_target(1).unwrap();
        assert_eq!(target, dog.get_key());
        assert!(Arc::ptr_eq(&hint.upgrade().unwrap(), dog.accessor()));

        let back = dog.accessor().find_backlink(person.get_key(), 1).unwrap();
        let (origin, hint) = dog.accessor().backlink_origin(back).unwrap();
        assert_eq!(origin, person.get_key());
        assert!(Arc::ptr_eq(&hint.upgrade().unwrap(), person.accessor()));
        assert!(dog.accessor().backlink_origin(back + 1).is_err());
        assert!(person.accessor().backlink_origin(0).is_err());
    }

    #[test]
    fn schema_change_marks_dirty_until_used() {
        let group = Group::new(GroupConfig::default());
        let t = group.add_table("t").unwrap();
        t.add_column(DataType::Int, "a", false).unwrap();
        assert!(t.accessor().is_dirty());
        assert_eq!(t.get_column_count().unwrap(), 1);
        assert!(!t.accessor().is_dirty());
    }

    #[test]
    fn column_beyond_layout_is_an_error() {
        let t = crate::TableRef::freestanding(GroupConfig::default());
        t.add_column(DataType::Int, "a", false).unwrap();
        t.get_column_count().unwrap();
        assert!(matches!(
            t.accessor().column(3),
            Err(TableError::ColumnDoesNotExist { ndx: 3, count: 1 })
        ));
        assert!(matches!(
            t.accessor().link_target(0),
            Err(TableError::NotALinkColumn(0))
        ));
    }
}

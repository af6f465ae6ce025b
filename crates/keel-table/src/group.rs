//! The [`Group`]: a container of linked tables.
//!
//! All tables of a group share one data lock and one transaction context.
//! Table accessors are cached per group behind a separate, reentrant lock,
//! which also serializes accessor teardown against concurrent lookups.
//! The lock order is accessors first, then data; mutations release the
//! data lock before publishing their effects to the accessors.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, trace};

use keel_schema::SchemaDescriptor;
use keel_types::{DataType, TableKey};

use crate::accessor::{HomeLink, TableAccessor};
use crate::config::{GroupConfig, SchemaConfig, TableConfig};
use crate::context::{TransactionContext, VersionContext};
use crate::data::{Effects, GroupData};
use crate::error::{TableError, TableResult};
use crate::replication::{ChangeLog, Instruction, Replication};
use crate::table::TableRef;
use crate::version;

type AccessorCache = HashMap<TableKey, Arc<TableAccessor>>;

/// State shared by a group and every accessor bound to it.
#[derive(Debug)]
pub(crate) struct GroupShared {
    pub(crate) data: Mutex<GroupData>,
    pub(crate) accessors: ReentrantMutex<RefCell<AccessorCache>>,
    pub(crate) context: Arc<dyn TransactionContext>,
}

impl GroupShared {
    pub(crate) fn new(config: GroupConfig, context: Arc<dyn TransactionContext>) -> Self {
        Self {
            data: Mutex::new(GroupData::new(config)),
            accessors: ReentrantMutex::new(RefCell::new(HashMap::new())),
            context,
        }
    }

    /// Shared state holding a single nameless table.
    pub(crate) fn freestanding(config: GroupConfig) -> (Self, TableKey) {
        let shared = Self::new(config, Arc::new(VersionContext::new()));
        let key = shared.data.lock().add_unnamed_table();
        (shared, key)
    }

    /// Run one mutation. Versions are propagated under the data lock; the
    /// replication sink, handle registries, and layout marks are updated
    /// after it is released. Effects collected before a failure are
    /// published as well, since the data already reflects them.
    pub(crate) fn mutate<R>(
        &self,
        origin: Option<&TableAccessor>,
        f: impl FnOnce(&mut GroupData, &mut Effects) -> TableResult<R>,
    ) -> TableResult<R> {
        let mut fx = Effects::default();
        let (result, dirty) = {
            let mut data = self.data.lock();
            let result = f(&mut data, &mut fx);
            version::propagate(&mut data, self.context.as_ref(), &fx.touched);
            let dirty = stale_layouts(&data, &fx);
            (result, dirty)
        };
        self.publish(fx, dirty, origin);
        result
    }

    fn publish(&self, fx: Effects, dirty: BTreeSet<TableKey>, origin: Option<&TableAccessor>) {
        if let Some(sink) = self.context.replication() {
            for instruction in fx.instructions {
                sink.record(instruction);
            }
        }
        if fx.removed.is_empty() && dirty.is_empty() {
            return;
        }

        let guard = self.accessors.lock();
        let cache = guard.borrow();
        let lookup = |table: TableKey| {
            cache
                .get(&table)
                .map(Arc::as_ref)
                .or_else(|| origin.filter(|o| o.key == table))
        };
        for (table, key) in &fx.removed {
            if let Some(accessor) = lookup(*table) {
                accessor.registry.lock().invalidate_object(*key);
            }
        }
        for (table, from) in &fx.reshaped {
            if let Some(accessor) = lookup(*table) {
                accessor.registry.lock().invalidate_columns_from(*from);
            }
        }
        for table in dirty {
            if let Some(accessor) = lookup(table) {
                accessor.mark_dirty();
            }
        }
    }

    // ---- Accessor cache ----

    /// Bind the cached accessor of `key`, creating it on first use.
    pub(crate) fn bind_table(self: &Arc<Self>, key: TableKey) -> TableResult<TableRef> {
        let guard = self.accessors.lock();
        let exists = self.data.lock().has_table(key);
        if !exists {
            return Err(TableError::NoSuchTable(key.to_string()));
        }
        let cached = guard.borrow().get(&key).cloned();
        let accessor = match cached {
            Some(accessor) => accessor,
            None => {
                let accessor = Arc::new(TableAccessor::new(
                    key,
                    HomeLink::Parent(Arc::downgrade(self)),
                ));
                guard.borrow_mut().insert(key, Arc::clone(&accessor));
                trace!(table = %key, "accessor created");
                accessor
            }
        };
        Ok(TableRef::bind(accessor))
    }

    /// Bind `hint` if it is still the cached accessor of `key`, otherwise
    /// look `key` up again.
    pub(crate) fn bind_hinted(
        self: &Arc<Self>,
        key: TableKey,
        hint: &std::sync::Weak<TableAccessor>,
    ) -> TableResult<TableRef> {
        let guard = self.accessors.lock();
        let cached = guard.borrow().get(&key).cloned();
        if let (Some(cached), Some(hinted)) = (cached, hint.upgrade()) {
            if Arc::ptr_eq(&cached, &hinted) {
                return Ok(TableRef::bind(hinted));
            }
        }
        self.bind_table(key)
    }

    /// Final step of an unbind that reached zero: re-check the count under
    /// the lock, then evict and tear down.
    pub(crate) fn release(&self, accessor: &Arc<TableAccessor>) {
        let guard = self.accessors.lock();
        if accessor.ref_count() != 0 {
            trace!(table = %accessor.key, "accessor rebound before teardown");
            return;
        }
        {
            let mut cache = guard.borrow_mut();
            if cache
                .get(&accessor.key)
                .is_some_and(|cached| Arc::ptr_eq(cached, accessor))
            {
                cache.remove(&accessor.key);
            }
        }
        accessor.teardown();
    }
}

/// Tables whose cached layout a mutation made stale: every reshaped table,
/// plus the tables linked to it, since their stored column indices moved.
fn stale_layouts(data: &GroupData, fx: &Effects) -> BTreeSet<TableKey> {
    let mut stale = BTreeSet::new();
    for &(table, _) in &fx.reshaped {
        stale.insert(table);
        if let Ok(data) = data.table(table) {
            stale.extend(data.linked_tables());
        }
    }
    stale
}

/// A container of tables that may link to one another.
///
/// Dropping the group detaches every table accessor still alive; handles
/// obtained from it report `is_attached() == false` afterwards.
#[derive(Debug)]
pub struct Group {
    shared: Arc<GroupShared>,
    change_log: Option<Arc<ChangeLog>>,
}

impl Group {
    /// Create an empty group. With `config.replication` set, every mutation
    /// is recorded in a [`ChangeLog`].
    pub fn new(config: GroupConfig) -> Self {
        if config.replication {
            let log = Arc::new(ChangeLog::new());
            let sink: Arc<dyn Replication> = Arc::clone(&log) as Arc<dyn Replication>;
            let context = Arc::new(VersionContext::with_replication(sink));
            Self {
                shared: Arc::new(GroupShared::new(config, context)),
                change_log: Some(log),
            }
        } else {
            Self::with_context(config, Arc::new(VersionContext::new()))
        }
    }

    /// Create an empty group driven by a caller-supplied context.
    pub fn with_context(config: GroupConfig, context: Arc<dyn TransactionContext>) -> Self {
        Self {
            shared: Arc::new(GroupShared::new(config, context)),
            change_log: None,
        }
    }

    /// Build a group from a declarative schema. Tables are created first so
    /// link columns may target any table of the schema.
    pub fn from_schema(schema: &SchemaConfig) -> TableResult<Self> {
        let group = Self::new(schema.group.clone());
        let mut tables = Vec::with_capacity(schema.tables.len());
        for table in &schema.tables {
            tables.push(group.add_table(&table.name)?);
        }
        for (config, table) in schema.tables.iter().zip(&tables) {
            group.apply_table_config(config, table)?;
        }
        debug!(tables = tables.len(), "group built from schema");
        Ok(group)
    }

    fn apply_table_config(&self, config: &TableConfig, table: &TableRef) -> TableResult<()> {
        for column in &config.columns {
            let data_type = column.resolved_type()?;
            let ndx = if data_type.is_link() {
                let target = column.target.as_deref().ok_or_else(|| {
                    TableError::IllegalCombination(format!(
                        "link column {:?} has no target",
                        column.name
                    ))
                })?;
                let target = self.get_table_by_name(target)?;
                table.add_column_link(data_type, &column.name, &target, column.strength)?
            } else {
                if column.target.is_some() {
                    return Err(TableError::IllegalCombination(format!(
                        "column {:?} of type {data_type} cannot have a target",
                        column.name
                    )));
                }
                table.add_column(data_type, &column.name, column.nullable)?
            };
            if column.indexed {
                table.add_search_index(ndx)?;
            }
        }
        if let Some(name) = &config.primary_key {
            let ndx = table.get_column_index(name)?.ok_or_else(|| {
                TableError::IllegalCombination(format!(
                    "primary key {name:?} is not a column of {:?}",
                    config.name
                ))
            })?;
            table.set_primary_key(Some(ndx))?;
        }
        Ok(())
    }

    // ---- Tables ----

    pub fn add_table(&self, name: &str) -> TableResult<TableRef> {
        let key = self.shared.mutate(None, |data, fx| {
            let key = data.add_table(name)?;
            fx.record(Instruction::AddTable {
                table: key,
                name: name.to_string(),
            });
            Ok(key)
        })?;
        debug!(table = %key, name, "added table");
        self.shared.bind_table(key)
    }

    pub fn get_table(&self, key: TableKey) -> TableResult<TableRef> {
        self.shared.bind_table(key)
    }

    pub fn get_table_by_name(&self, name: &str) -> TableResult<TableRef> {
        let key = self
            .shared
            .data
            .lock()
            .find_table(name)
            .ok_or_else(|| TableError::NoSuchTable(name.to_string()))?;
        self.shared.bind_table(key)
    }

    /// Remove a table. Fails with `CrossTableLinkTarget` while another table
    /// links to it. Handles bound to the table are detached.
    pub fn remove_table(&self, key: TableKey) -> TableResult<()> {
        if !self.has_table(key) {
            return Err(TableError::NoSuchTable(key.to_string()));
        }
        self.shared.mutate(None, |data, fx| data.remove_table(key, fx))?;
        let guard = self.shared.accessors.lock();
        let evicted = guard.borrow_mut().remove(&key);
        if let Some(accessor) = evicted {
            let invalidated = accessor.detach();
            let outstanding = accessor.registry.lock().live();
            debug!(table = %key, invalidated, outstanding, "detached removed table");
        }
        Ok(())
    }

    pub fn table_keys(&self) -> Vec<TableKey> {
        self.shared.data.lock().table_keys()
    }

    pub fn has_table(&self, key: TableKey) -> bool {
        self.shared.data.lock().has_table(key)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.shared.data.lock().tables().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- Transactions ----

    /// Enter a new read episode: rebuild the layout of every accessor
    /// whose schema changed. Returns how many accessors were refreshed.
    pub fn advance_read(&self) -> usize {
        let guard = self.shared.accessors.lock();
        let dirty: Vec<Arc<TableAccessor>> = guard
            .borrow()
            .values()
            .filter(|accessor| accessor.is_dirty())
            .cloned()
            .collect();
        for accessor in &dirty {
            accessor.refresh(&self.shared);
        }
        drop(guard);
        debug!(refreshed = dirty.len(), "advanced read");
        dirty.len()
    }

    /// The change log attached by `GroupConfig::replication`, if any.
    pub fn change_log(&self) -> Option<&Arc<ChangeLog>> {
        self.change_log.as_ref()
    }

    pub fn context(&self) -> &Arc<dyn TransactionContext> {
        &self.shared.context
    }

    /// Number of table accessors currently cached.
    pub fn live_accessors(&self) -> usize {
        self.shared.accessors.lock().borrow().len()
    }

    /// Names and column types of every table, in table-key order.
    pub fn describe(&self) -> Vec<(String, Vec<(String, DataType)>)> {
        let data = self.shared.data.lock();
        data.tables()
            .map(|table| {
                let columns = table
                    .spec
                    .columns()
                    .iter()
                    .take(table.spec.public_column_count())
                    .map(|c| (c.name.clone(), c.data_type))
                    .collect();
                (table.name.clone(), columns)
            })
            .collect()
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        let guard = self.shared.accessors.lock();
        let accessors: Vec<Arc<TableAccessor>> =
            guard.borrow_mut().drain().map(|(_, a)| a).collect();
        for accessor in &accessors {
            accessor.detach();
        }
        debug!(detached = accessors.len(), "group dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::{Key, LinkType};

    fn k(v: i64) -> Key {
        Key::new(v).unwrap()
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    #[test]
    fn add_and_lookup_tables() {
        let group = Group::new(GroupConfig::default());
        let a = group.add_table("a").unwrap();
        let b = group.add_table("b").unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group.table_keys(), vec![a.get_key(), b.get_key()]);
        assert_eq!(group.get_table_by_name("b").unwrap(), b);
        assert_eq!(group.get_table(a.get_key()).unwrap(), a);
        assert!(matches!(
            group.add_table("a"),
            Err(TableError::TableNameInUse(_))
        ));
        assert!(matches!(
            group.get_table_by_name("zzz"),
            Err(TableError::NoSuchTable(_))
        ));
    }

    #[test]
    fn same_table_shares_one_accessor() {
        let group = Group::new(GroupConfig::default());
        let a = group.add_table("a").unwrap();
        let again = group.get_table(a.get_key()).unwrap();
        assert!(Arc::ptr_eq(a.accessor(), again.accessor()));
        assert_eq!(a.accessor().ref_count(), 2);
        assert_eq!(group.live_accessors(), 1);
    }

    #[test]
    fn last_handle_evicts_accessor() {
        let group = Group::new(GroupConfig::default());
        let key = group.add_table("a").unwrap().get_key();
        assert_eq!(group.live_accessors(), 0);

        let t = group.get_table(key).unwrap();
        let u = t.clone();
        drop(t);
        assert_eq!(group.live_accessors(), 1);
        drop(u);
        assert_eq!(group.live_accessors(), 0);
        assert!(group.has_table(key));
    }

    #[test]
    fn remove_table_detaches_its_handles() {
        let group = Group::new(GroupConfig::default());
        let t = group.add_table("t").unwrap();
        let obj = t.create_object().unwrap();
        group.remove_table(t.get_key()).unwrap();

        assert!(!t.is_attached());
        assert!(!obj.is_valid());
        assert!(matches!(t.size(), Err(TableError::Detached)));
        assert!(!group.has_table(t.get_key()));
        assert!(matches!(
            group.remove_table(t.get_key()),
            Err(TableError::NoSuchTable(_))
        ));
    }

    #[test]
    fn linked_table_cannot_be_removed() {
        let group = Group::new(GroupConfig::default());
        let a = group.add_table("a").unwrap();
        let b = group.add_table("b").unwrap();
        a.add_column_link(DataType::Link, "b", &b, LinkType::Weak)
            .unwrap();
        assert!(matches!(
            group.remove_table(b.get_key()),
            Err(TableError::CrossTableLinkTarget(_))
        ));
        group.remove_table(a.get_key()).unwrap();
        assert_eq!(b.get_column_count().unwrap(), 0);
        assert!(b.accessor().find_backlink(a.get_key(), 0).is_none());
        group.remove_table(b.get_key()).unwrap();
        assert!(group.is_empty());
    }

    #[test]
    fn dropping_group_detaches_everything() {
        let group = Group::new(GroupConfig::default());
        let t = group.add_table("t").unwrap();
        let obj = t.create_object().unwrap();
        let view = t.view().unwrap();
        drop(group);

        assert!(!t.is_attached());
        assert!(!obj.is_valid());
        assert!(!view.is_attached());
        assert!(matches!(t.create_object(), Err(TableError::Detached)));
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    #[test]
    fn advance_read_visits_only_dirty_accessors() {
        let group = Group::new(GroupConfig::default());
        let a = group.add_table("a").unwrap();
        let b = group.add_table("b").unwrap();
        let c = group.add_table("c").unwrap();
        assert_eq!(group.advance_read(), 3);
        assert_eq!(group.advance_read(), 0);

        a.add_column_link(DataType::LinkList, "bs", &b, LinkType::Strong)
            .unwrap();
        assert!(a.accessor().is_dirty());
        assert!(b.accessor().is_dirty());
        assert!(!c.accessor().is_dirty());
        assert_eq!(group.advance_read(), 2);
        assert!(!a.accessor().is_dirty());
        assert!(!b.accessor().is_dirty());
    }

    // -----------------------------------------------------------------------
    // Replication and schema files
    // -----------------------------------------------------------------------

    #[test]
    fn change_log_records_mutations_in_order() {
        let group = Group::new(GroupConfig {
            replication: true,
            ..GroupConfig::default()
        });
        let t = group.add_table("t").unwrap();
        t.add_column(DataType::Int, "x", false).unwrap();
        let obj = t.create_object().unwrap();
        obj.set::<i64>(0, 7).unwrap();

        let log = group.change_log().unwrap().take();
        let key = t.get_key();
        assert_eq!(
            log,
            vec![
                Instruction::AddTable {
                    table: key,
                    name: "t".into()
                },
                Instruction::InsertColumn {
                    table: key,
                    ndx: 0,
                    name: "x".into(),
                    data_type: DataType::Int,
                    nullable: false
                },
                Instruction::CreateObject { table: key, key: k(0) },
                Instruction::Set {
                    table: key,
                    key: k(0),
                    ndx: 0,
                    value: keel_types::Value::Int(7)
                },
            ]
        );
    }

    #[test]
    fn no_change_log_by_default() {
        assert!(Group::new(GroupConfig::default()).change_log().is_none());
    }

    const SCHEMA: &str = r#"
        [[tables]]
        name = "person"
        primary_key = "id"

        [[tables.columns]]
        name = "id"
        type = "int"

        [[tables.columns]]
        name = "pets"
        type = "link"
        list = true
        target = "dog"
        strength = "strong"

        [[tables]]
        name = "dog"

        [[tables.columns]]
        name = "name"
        type = "string"
        indexed = true
    "#;

    #[test]
    fn from_schema_builds_linked_tables() {
        let schema = SchemaConfig::from_toml_str(SCHEMA).unwrap();
        let group = Group::from_schema(&schema).unwrap();
        let person = group.get_table_by_name("person").unwrap();
        let dog = group.get_table_by_name("dog").unwrap();

        assert_eq!(person.get_column_count().unwrap(), 2);
        assert_eq!(person.get_primary_key().unwrap(), Some(0));
        assert!(person.has_search_index(0).unwrap());
        assert_eq!(person.get_column_type(1).unwrap(), DataType::LinkList);
        assert_eq!(person.get_link_target(1).unwrap(), dog);
        assert!(dog.has_search_index(0).unwrap());

        let described = group.describe();
        assert_eq!(described[1].0, "dog");
        assert_eq!(described[1].1, vec![("name".to_string(), DataType::String)]);
    }

    #[test]
    fn from_schema_rejects_dangling_targets() {
        let text = r#"
            [[tables]]
            name = "a"
            [[tables.columns]]
            name = "b"
            type = "link"
            target = "missing"
        "#;
        let schema = SchemaConfig::from_toml_str(text).unwrap();
        assert!(matches!(
            Group::from_schema(&schema),
            Err(TableError::NoSuchTable(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Concurrent bind / unbind
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_bind_and_unbind_never_hand_out_detached_accessors() {
        let group = Group::new(GroupConfig::default());
        let key = group.add_table("shared").unwrap().get_key();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        let t = group.get_table(key).unwrap();
                        assert!(t.is_attached());
                        let u = t.clone();
                        drop(t);
                        assert!(u.is_attached());
                        drop(u);
                    }
                });
            }
        });

        assert_eq!(group.live_accessors(), 0);
        let t = group.get_table(key).unwrap();
        assert_eq!(t.accessor().ref_count(), 1);
    }
}

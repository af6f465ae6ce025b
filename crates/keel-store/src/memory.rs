use std::collections::BTreeMap;

use keel_types::{Key, Value};
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::object::ObjectRecord;
use crate::traits::ObjectStore;

/// In-memory, `BTreeMap`-based object store.
///
/// Intended for tests and embedding. Records are held in key order so that
/// iteration never needs a sort.
#[derive(Default)]
pub struct InMemoryObjectStore {
    records: BTreeMap<Key, ObjectRecord>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest key currently stored.
    pub fn last_key(&self) -> Option<Key> {
        self.records.keys().next_back().copied()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get(&self, key: Key) -> StoreResult<&ObjectRecord> {
        self.records.get(&key).ok_or(StoreError::NotFound(key))
    }

    fn get_mut(&mut self, key: Key) -> StoreResult<&mut ObjectRecord> {
        self.records.get_mut(&key).ok_or(StoreError::NotFound(key))
    }

    fn is_valid(&self, key: Key) -> bool {
        self.records.contains_key(&key)
    }

    fn insert(&mut self, key: Key, record: ObjectRecord) -> StoreResult<()> {
        if self.records.contains_key(&key) {
            return Err(StoreError::DuplicateKey(key));
        }
        self.records.insert(key, record);
        Ok(())
    }

    fn erase(&mut self, key: Key) -> StoreResult<ObjectRecord> {
        self.records.remove(&key).ok_or(StoreError::NotFound(key))
    }

    fn keys(&self) -> Vec<Key> {
        self.records.keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn insert_column(&mut self, ndx: usize, default: &Value) {
        trace!(ndx, records = self.records.len(), "inserting cell in every record");
        for record in self.records.values_mut() {
            record.insert_cell(ndx, default.clone());
        }
    }

    fn erase_column(&mut self, ndx: usize) {
        trace!(ndx, records = self.records.len(), "erasing cell from every record");
        for record in self.records.values_mut() {
            record.erase_cell(ndx);
        }
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("record_count", &self.records.len())
            .finish()
    }
}

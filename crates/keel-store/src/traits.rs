use keel_types::{Key, Value};

use crate::error::StoreResult;
use crate::object::ObjectRecord;

/// Keyed storage of object records.
///
/// All implementations must satisfy these invariants:
/// - A key maps to at most one record.
/// - `keys()` yields keys in ascending order.
/// - Every record has exactly one cell per column; shape changes go through
///   `insert_column`/`erase_column` and apply to all records.
/// - The store never interprets cell contents.
///
/// Mutation takes `&mut self`: a store is owned by the single thread
/// mutating the enclosing table.
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Borrow the record stored under `key`.
    fn get(&self, key: Key) -> StoreResult<&ObjectRecord>;

    /// Mutably borrow the record stored under `key`.
    fn get_mut(&mut self, key: Key) -> StoreResult<&mut ObjectRecord>;

    /// Check whether a record is stored under `key`.
    fn is_valid(&self, key: Key) -> bool;

    /// Store a new record. Fails if `key` is already present.
    fn insert(&mut self, key: Key, record: ObjectRecord) -> StoreResult<()>;

    /// Remove and return the record stored under `key`.
    fn erase(&mut self, key: Key) -> StoreResult<ObjectRecord>;

    /// All keys, in ascending order.
    fn keys(&self) -> Vec<Key>;

    /// Number of stored records.
    fn len(&self) -> usize;

    /// Returns `true` if no records are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a cell holding `default` at position `ndx` in every record.
    fn insert_column(&mut self, ndx: usize, default: &Value);

    /// Remove the cell at position `ndx` from every record.
    fn erase_column(&mut self, ndx: usize);

    /// Remove every record.
    fn clear(&mut self);

    /// First key (in key order) whose cell `ndx` satisfies `pred`.
    ///
    /// Default implementation walks `keys()`. Backends may override with an
    /// index-assisted lookup.
    fn find_first(&self, ndx: usize, pred: &dyn Fn(&Value) -> bool) -> Option<Key> {
        self.keys().into_iter().find(|key| {
            self.get(*key)
                .and_then(|rec| rec.get(ndx))
                .map(|cell| pred(cell))
                .unwrap_or(false)
        })
    }
}

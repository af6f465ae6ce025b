//! Dense storage for sequences of nullable keys.
//!
//! A [`KeyArray`] keeps no separate null bitmap. Each slot holds a single
//! integer: `0` means null and `v + 1` means the key `v`. This is why
//! [`Key::MAX_VALUE`] stops one short of `i64::MAX`.
//!
//! Link lists and backlink sets are both stored as key arrays.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::Key;

const NULL_SLOT: i64 = 0;

fn encode(key: Key) -> i64 {
    key.value() + 1
}

fn decode(stored: i64) -> Option<Key> {
    if stored == NULL_SLOT {
        None
    } else {
        Key::new(stored - 1).ok()
    }
}

/// An ordered sequence of nullable keys, stored as `value + 1`.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyArray {
    slots: Vec<i64>,
}

impl KeyArray {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an array holding the given keys in order.
    pub fn from_keys<I: IntoIterator<Item = Key>>(keys: I) -> Self {
        Self {
            slots: keys.into_iter().map(encode).collect(),
        }
    }

    /// Number of slots, null slots included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the array has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append a key.
    pub fn add(&mut self, key: Key) {
        self.slots.push(encode(key));
    }

    /// Append a null slot.
    pub fn add_null(&mut self) {
        self.slots.push(NULL_SLOT);
    }

    /// Overwrite the slot at `ndx` with `key`.
    ///
    /// # Panics
    ///
    /// Panics if `ndx` is out of bounds.
    pub fn set(&mut self, ndx: usize, key: Key) {
        self.slots[ndx] = encode(key);
    }

    /// Zero the slot at `ndx` in place. The array does not shrink.
    ///
    /// # Panics
    ///
    /// Panics if `ndx` is out of bounds.
    pub fn set_null(&mut self, ndx: usize) {
        self.slots[ndx] = NULL_SLOT;
    }

    /// Insert `key` before the slot at `ndx`.
    ///
    /// # Panics
    ///
    /// Panics if `ndx > len`.
    pub fn insert(&mut self, ndx: usize, key: Key) {
        self.slots.insert(ndx, encode(key));
    }

    /// Decode the slot at `ndx`. Returns `None` for a null slot or an
    /// out-of-bounds index.
    pub fn get(&self, ndx: usize) -> Option<Key> {
        self.slots.get(ndx).copied().and_then(decode)
    }

    /// Decode every slot.
    pub fn get_all(&self) -> Vec<Option<Key>> {
        self.slots.iter().copied().map(decode).collect()
    }

    /// Iterate over the non-null keys in slot order.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.slots.iter().copied().filter_map(decode)
    }

    /// Returns `true` if the slot at `ndx` is null.
    ///
    /// # Panics
    ///
    /// Panics if `ndx` is out of bounds.
    pub fn is_null(&self, ndx: usize) -> bool {
        self.slots[ndx] == NULL_SLOT
    }

    /// Remove the slot at `ndx`, shifting later slots down.
    ///
    /// # Panics
    ///
    /// Panics if `ndx` is out of bounds.
    pub fn erase(&mut self, ndx: usize) -> Option<Key> {
        decode(self.slots.remove(ndx))
    }

    /// Drop every slot from `ndx` onwards.
    pub fn truncate(&mut self, ndx: usize) {
        self.slots.truncate(ndx);
    }

    /// Remove all slots.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Position of the first slot in `begin..end` holding `key`.
    ///
    /// The query value is encoded and compared against the raw slots, so
    /// no slot is decoded during the scan. `end` is clamped to the length.
    pub fn find_first(&self, key: Key, begin: usize, end: usize) -> Option<usize> {
        let end = end.min(self.slots.len());
        if begin >= end {
            return None;
        }
        let needle = encode(key);
        self.slots[begin..end]
            .iter()
            .position(|&slot| slot == needle)
            .map(|pos| begin + pos)
    }

    /// Returns `true` if any slot holds `key`.
    pub fn contains(&self, key: Key) -> bool {
        self.find_first(key, 0, self.slots.len()).is_some()
    }

    /// Number of slots holding `key`.
    pub fn count(&self, key: Key) -> usize {
        let needle = encode(key);
        self.slots.iter().filter(|&&slot| slot == needle).count()
    }

    /// Remove the first slot holding `key`. Unlike [`set_null`], the array
    /// shrinks by one.
    ///
    /// # Panics
    ///
    /// `key` must be present. Calling this for an absent key means the
    /// caller's link bookkeeping is already inconsistent, and it panics.
    ///
    /// [`set_null`]: KeyArray::set_null
    pub fn nullify(&mut self, key: Key) {
        let Some(pos) = self.find_first(key, 0, self.slots.len()) else {
            panic!("KeyArray::nullify: key {key} is not present");
        };
        self.slots.remove(pos);
    }

    /// The encoded slots, exactly as stored.
    pub fn raw(&self) -> &[i64] {
        &self.slots
    }
}

impl FromIterator<Key> for KeyArray {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Self::from_keys(iter)
    }
}

impl fmt::Debug for KeyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.get_all()).finish()
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of an object within one table.
///
/// Keys are unique among the live objects of a table and are never handed
/// out twice, even after the object they named is removed. The upper end of
/// the `i64` range is reserved: a [`KeyArray`](crate::KeyArray) stores
/// `value + 1`, so `i64::MAX` itself cannot be represented.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Key(i64);

impl Key {
    /// Largest representable key value.
    pub const MAX_VALUE: i64 = i64::MAX - 1;

    /// The largest representable key.
    pub const MAX: Key = Key(Self::MAX_VALUE);

    /// The smallest key.
    pub const MIN: Key = Key(0);

    /// Create a key, rejecting values outside `0..=Key::MAX_VALUE`.
    pub fn new(value: i64) -> Result<Self, TypeError> {
        if (0..=Self::MAX_VALUE).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TypeError::KeyOutOfRange(value))
        }
    }

    /// The raw integer value.
    pub const fn value(self) -> i64 {
        self.0
    }

    /// The key following this one, or `None` at the top of the range.
    pub fn next(self) -> Option<Key> {
        if self.0 < Self::MAX_VALUE {
            Some(Key(self.0 + 1))
        } else {
            None
        }
    }
}

impl TryFrom<i64> for Key {
    type Error = TypeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Key::new(value)
    }
}

impl From<Key> for i64 {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a table within its group.
///
/// Table keys are slot indices in the owning group. They act as the
/// back-reference half of a `(container, lookup)` pair: a table never holds
/// a pointer to another table, only its `TableKey`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey(u32);

impl TableKey {
    /// Create a table key from a slot index.
    pub const fn new(slot: u32) -> Self {
        Self(slot)
    }

    /// The slot index.
    pub const fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableKey({})", self.0)
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

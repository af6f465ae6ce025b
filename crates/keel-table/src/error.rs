//! Error types for table operations.

use keel_schema::SchemaError;
use keel_store::StoreError;
use keel_types::{DataType, Key, TypeError};

/// Errors raised by tables, groups, and the handles bound to them.
///
/// Structural faults (bad column index, type mismatch, detached accessor)
/// are precondition violations. Callers are expected to abandon the current
/// transaction when one surfaces.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// A column index at or past the public column count.
    #[error("column {ndx} does not exist (table has {count} columns)")]
    ColumnDoesNotExist { ndx: usize, count: usize },

    /// The requested type disagrees with the stored column type.
    #[error("type mismatch on column {ndx}: requested {expected}, column is {actual}")]
    TypeMismatch {
        ndx: usize,
        expected: DataType,
        actual: DataType,
    },

    /// A typed read hit a null cell with a non-optional type.
    #[error("column {ndx} holds null")]
    NullValue { ndx: usize },

    /// The accessor no longer refers to a live table.
    #[error("table accessor is detached")]
    Detached,

    /// No live object with this key.
    #[error("no object with key {0}")]
    NoSuchObject(Key),

    /// The key names a live object, or named one before.
    #[error("key {0} is already in use or was used before")]
    KeyAlreadyUsed(Key),

    /// The generated key counter ran off the end of the key domain.
    #[error("key space exhausted")]
    KeysExhausted,

    /// Arguments that cannot be combined.
    #[error("illegal combination: {0}")]
    IllegalCombination(String),

    /// The search index of the primary key column cannot be removed.
    #[error("column {0} is the primary key")]
    PrimaryKeyIndex(usize),

    /// The table is the target of links from another table.
    #[error("table {0} is the target of cross-table links")]
    CrossTableLinkTarget(String),

    /// A link operation on a column that is not a link column.
    #[error("column {0} is not a link column")]
    NotALinkColumn(usize),

    /// Link columns require a table that belongs to a group.
    #[error("operation requires a group-level table")]
    NotGroupLevel,

    /// No table with this name or key.
    #[error("no such table: {0}")]
    NoSuchTable(String),

    /// A table with this name already exists in the group.
    #[error("table name already in use: {0}")]
    TableNameInUse(String),

    /// A positional index past the end of a list or view.
    #[error("index {ndx} out of bounds (size {size})")]
    IndexOutOfBounds { ndx: usize, size: usize },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for table results.
pub type TableResult<T> = Result<T, TableError>;

//! Error types for schema operations.

use thiserror::Error;

/// Errors that can occur during schema operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The column or table name is invalid.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// A public column with this name already exists.
    #[error("column already exists: {name}")]
    DuplicateColumn { name: String },

    /// A column index is out of range for the operation.
    #[error("column index {ndx} out of range (limit {limit})")]
    IndexOutOfRange { ndx: usize, limit: usize },

    /// The operation applies only to link columns.
    #[error("column {ndx} is not a link column")]
    NotALinkColumn { ndx: usize },

    /// The column type cannot carry a search index.
    #[error("column {ndx} cannot be indexed")]
    NotIndexable { ndx: usize },

    /// The search index of a primary key column cannot be removed.
    #[error("column {ndx} is the primary key; its search index cannot be removed")]
    PrimaryKeyIndex { ndx: usize },
}

/// Convenience type alias for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;

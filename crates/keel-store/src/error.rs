use keel_types::Key;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// No record is stored under the key.
    #[error("object not found: {0}")]
    NotFound(Key),

    /// A record is already stored under the key.
    #[error("duplicate key: {0}")]
    DuplicateKey(Key),

    /// A cell index beyond the record width was addressed.
    #[error("cell {ndx} out of range for record of width {width}")]
    CellOutOfRange { ndx: usize, width: usize },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

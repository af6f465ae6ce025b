use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("key value {0} is outside the representable range 0..={max}", max = crate::Key::MAX_VALUE)]
    KeyOutOfRange(i64),

    #[error("nanoseconds must be below one second, got {0}")]
    InvalidNanoseconds(u32),

    #[error("unknown data type: {0}")]
    UnknownDataType(String),

    #[error("unknown link strength: {0}")]
    UnknownLinkType(String),
}

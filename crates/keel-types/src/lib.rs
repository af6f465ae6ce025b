//! Foundation types for keel.
//!
//! This crate provides the identifier, encoding, and value types used
//! throughout the keel object store. Every other keel crate depends on
//! `keel-types`.
//!
//! # Key Types
//!
//! - [`Key`]: Stable per-table object identifier, never reused
//! - [`TableKey`]: Identifier of a table within its group
//! - [`KeyArray`]: Dense sequence of nullable keys stored as `value + 1`
//! - [`DataType`] / [`LinkType`]: Column type and link strength
//! - [`Value`]: Dynamically typed cell contents
//! - [`Timestamp`]: Seconds + nanoseconds point in time

pub mod data_type;
pub mod error;
pub mod key;
pub mod key_array;
pub mod timestamp;
pub mod value;

pub use data_type::{DataType, LinkType};
pub use error::TypeError;
pub use key::{Key, TableKey};
pub use key_array::KeyArray;
pub use timestamp::Timestamp;
pub use value::Value;

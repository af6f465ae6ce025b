//! Keyed object storage for keel tables.
//!
//! A table never stores object state itself. Every object is a record of
//! cells held by an [`ObjectStore`], addressed by its [`Key`]. The table
//! layer decides which keys exist and what the cells mean; the store only
//! keeps records in key order.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `BTreeMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. A key maps to at most one record; inserting an existing key fails.
//! 2. Iteration is in ascending key order.
//! 3. Every record has one cell per column. Column shape changes are
//!    applied to all records at once through `insert_column`/`erase_column`.
//! 4. The store never interprets cell contents.
//!
//! [`Key`]: keel_types::Key

pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::ObjectRecord;
pub use traits::ObjectStore;

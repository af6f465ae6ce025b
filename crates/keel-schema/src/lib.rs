//! Schema descriptors for keel tables.
//!
//! A table's dynamic type is an ordered list of columns. Public columns come
//! first; backlink columns, which exist only to mirror link columns in other
//! tables, follow them and are never visible through the public column count.
//!
//! # Architecture
//!
//! - **Public columns** are created, renamed, and removed by users. Their
//!   names are unique and length-bounded.
//! - **Link columns** name a target table and carry the index of their
//!   reciprocal backlink column in that target.
//! - **Backlink columns** name their origin table and origin column. They
//!   are created and destroyed only together with the link column they
//!   mirror.
//!
//! # Modules
//!
//! - [`error`]: Error types for schema operations
//! - [`column`]: Column descriptors: [`ColumnSpec`], [`LinkInfo`], [`BacklinkInfo`]
//! - [`traits`]: The [`SchemaDescriptor`] trait, the read surface used by tables
//! - [`names`]: Column and table name validation
//! - [`spec`]: In-memory [`Spec`], the mutable descriptor tables own

pub mod column;
pub mod error;
pub mod names;
pub mod spec;
pub mod traits;

pub use column::{BacklinkInfo, ColumnSpec, LinkInfo};
pub use error::{Result, SchemaError};
pub use names::{validate_column_name, validate_table_name, DEFAULT_MAX_NAME_LENGTH};
pub use spec::Spec;
pub use traits::SchemaDescriptor;

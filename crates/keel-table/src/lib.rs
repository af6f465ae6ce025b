//! Tables and the object graph of the keel object store.
//!
//! This crate provides:
//! - [`Group`], the container of named tables, and [`TableRef`], the
//!   reference-counted table accessor
//! - Weak and strong links with mirrored backlinks, and cascade removal of
//!   strongly owned objects
//! - Row ([`Obj`]), list ([`LinkList`]), and view ([`TableView`]) handles,
//!   invalidated when what they point at goes away
//! - Link chains ([`LinkChain`], [`Column`]) for walking the link graph
//! - Per-table version counters that propagate along links
//! - A [`Replication`] sink that receives every mutation as an
//!   [`Instruction`]
//!
//! # Threading
//!
//! Any number of threads may hold and drop [`TableRef`]s to the same group.
//! Mutations are serialised by the group's data lock; handle bookkeeping and
//! accessor teardown use their own locks and never run user code while
//! holding the data lock.

mod accessor;
mod cascade;
mod data;
mod links;
mod registry;
mod schema;
mod version;

pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod group;
pub mod link_list;
pub mod obj;
pub mod replication;
pub mod table;
pub mod value;
pub mod view;

pub use chain::{Column, LinkChain};
pub use config::{ColumnConfig, GroupConfig, SchemaConfig, TableConfig};
pub use context::{TransactionContext, VersionContext};
pub use error::{TableError, TableResult};
pub use group::Group;
pub use link_list::LinkList;
pub use obj::Obj;
pub use replication::{ChangeLog, Instruction, Replication};
pub use schema::BacklinkSlot;
pub use table::TableRef;
pub use value::ColumnValue;
pub use view::TableView;

pub use keel_types::{DataType, Key, LinkType, TableKey, Timestamp, Value};

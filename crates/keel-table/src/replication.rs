//! Replication sink: logical notifications of schema and data mutations.
//!
//! The table layer emits one [`Instruction`] per externally requested
//! mutation. Implied effects (cascade removals, nullified incoming links)
//! are reported as well so a replica replaying the log stays identical
//! without re-running the cascade.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use keel_types::{DataType, Key, LinkType, TableKey, Value};

/// A logical mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    AddTable {
        table: TableKey,
        name: String,
    },
    RemoveTable {
        table: TableKey,
    },
    InsertColumn {
        table: TableKey,
        ndx: usize,
        name: String,
        data_type: DataType,
        nullable: bool,
    },
    InsertLinkColumn {
        table: TableKey,
        ndx: usize,
        name: String,
        data_type: DataType,
        target: TableKey,
        link_type: LinkType,
    },
    RemoveColumn {
        table: TableKey,
        ndx: usize,
    },
    RenameColumn {
        table: TableKey,
        ndx: usize,
        name: String,
    },
    SetLinkType {
        table: TableKey,
        ndx: usize,
        link_type: LinkType,
    },
    SetSearchIndex {
        table: TableKey,
        ndx: usize,
        indexed: bool,
    },
    SetPrimaryKey {
        table: TableKey,
        ndx: Option<usize>,
    },
    CreateObject {
        table: TableKey,
        key: Key,
    },
    RemoveObject {
        table: TableKey,
        key: Key,
    },
    Set {
        table: TableKey,
        key: Key,
        ndx: usize,
        value: Value,
    },
    ListInsert {
        table: TableKey,
        key: Key,
        ndx: usize,
        pos: usize,
        target: Key,
    },
    ListSet {
        table: TableKey,
        key: Key,
        ndx: usize,
        pos: usize,
        target: Key,
    },
    ListErase {
        table: TableKey,
        key: Key,
        ndx: usize,
        pos: usize,
    },
    ListClear {
        table: TableKey,
        key: Key,
        ndx: usize,
    },
}

/// Receiver of logical mutation notifications.
pub trait Replication: Send + Sync + std::fmt::Debug {
    fn record(&self, instruction: Instruction);
}

/// In-memory [`Replication`] sink that keeps every instruction in order.
#[derive(Debug, Default)]
pub struct ChangeLog {
    entries: Mutex<Vec<Instruction>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded instructions.
    pub fn instructions(&self) -> Vec<Instruction> {
        self.entries.lock().clone()
    }

    /// Remove and return all recorded instructions.
    pub fn take(&self) -> Vec<Instruction> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the log as JSON lines.
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let entries = self.entries.lock();
        let mut out = String::new();
        for entry in entries.iter() {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl Replication for ChangeLog {
    fn record(&self, instruction: Instruction) {
        self.entries.lock().push(instruction);
    }
}

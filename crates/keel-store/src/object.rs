use serde::{Deserialize, Serialize};

use keel_types::Value;

use crate::error::{StoreError, StoreResult};

/// The stored state of one object: one cell per column, in column order.
///
/// Backlink columns are cells like any other; the store does not know
/// which cells are public.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    cells: Vec<Value>,
}

impl ObjectRecord {
    /// Create a record from its cells.
    pub fn new(cells: Vec<Value>) -> Self {
        Self { cells }
    }

    /// Number of cells.
    pub fn width(&self) -> usize {
        self.cells.len()
    }

    /// Borrow the cell at `ndx`.
    pub fn get(&self, ndx: usize) -> StoreResult<&Value> {
        let width = self.cells.len();
        self.cells
            .get(ndx)
            .ok_or(StoreError::CellOutOfRange { ndx, width })
    }

    /// Mutably borrow the cell at `ndx`.
    pub fn get_mut(&mut self, ndx: usize) -> StoreResult<&mut Value> {
        let width = self.cells.len();
        self.cells
            .get_mut(ndx)
            .ok_or(StoreError::CellOutOfRange { ndx, width })
    }

    /// Replace the cell at `ndx`, returning the previous value.
    pub fn set(&mut self, ndx: usize, value: Value) -> StoreResult<Value> {
        let cell = self.get_mut(ndx)?;
        Ok(std::mem::replace(cell, value))
    }

    /// All cells in column order.
    pub fn cells(&self) -> &[Value] {
        &self.cells
    }

    pub(crate) fn insert_cell(&mut self, ndx: usize, value: Value) {
        let ndx = ndx.min(self.cells.len());
        self.cells.insert(ndx, value);
    }

    pub(crate) fn erase_cell(&mut self, ndx: usize) {
        if ndx < self.cells.len() {
            self.cells.remove(ndx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_returns_previous_value() {
        let mut rec = ObjectRecord::new(vec![Value::Int(1), Value::Null]);
        let old = rec.set(0, Value::Int(5)).unwrap();
        assert_eq!(old, Value::Int(1));
        assert_eq!(rec.get(0).unwrap(), &Value::Int(5));
    }

    #[test]
    fn out_of_range_cell() {
        let rec = ObjectRecord::new(vec![Value::Null]);
        assert_eq!(
            rec.get(3),
            Err(StoreError::CellOutOfRange { ndx: 3, width: 1 })
        );
    }

    #[test]
    fn shape_changes() {
        let mut rec = ObjectRecord::new(vec![Value::Int(1), Value::Int(3)]);
        rec.insert_cell(1, Value::Int(2));
        assert_eq!(rec.cells(), &[Value::Int(1), Value::Int(2), Value::Int(3)]);
        rec.erase_cell(0);
        assert_eq!(rec.width(), 2);
        rec.erase_cell(10);
        assert_eq!(rec.width(), 2);
    }

    #[test]
    fn serde_roundtrip() {
        let rec = ObjectRecord::new(vec![Value::String("a".into()), Value::Bool(true)]);
        let json = serde_json::to_string(&rec).unwrap();
        let parsed: ObjectRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, parsed);
    }
}

//! Typed access to cells.

use keel_types::{DataType, Timestamp, Value};

use crate::error::{TableError, TableResult};

/// A Rust type that maps onto one column type.
///
/// `Option<T>` maps onto the nullable form of `T`'s column type and reads
/// null cells as `None`. Reading a null cell as a plain `T` fails with
/// [`TableError::NullValue`].
pub trait ColumnValue: Sized {
    const DATA_TYPE: DataType;

    /// Extract a value, or `None` if the cell holds something else.
    fn from_value(value: &Value) -> Option<Self>;

    fn into_value(self) -> Value;
}

macro_rules! column_value {
    ($ty:ty, $data_type:ident, $variant:ident, |$v:ident| $read:expr) => {
        impl ColumnValue for $ty {
            const DATA_TYPE: DataType = DataType::$data_type;

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant($v) => Some($read),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }
    };
}

column_value!(i64, Int, Int, |v| *v);
column_value!(bool, Bool, Bool, |v| *v);
column_value!(f32, Float, Float, |v| *v);
column_value!(f64, Double, Double, |v| *v);
column_value!(String, String, String, |v| v.clone());
column_value!(Vec<u8>, Binary, Binary, |v| v.clone());
column_value!(Timestamp, Timestamp, Timestamp, |v| *v);

impl<T: ColumnValue> ColumnValue for Option<T> {
    const DATA_TYPE: DataType = T::DATA_TYPE;

    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }

    fn into_value(self) -> Value {
        self.map_or(Value::Null, T::into_value)
    }
}

/// Reject a typed access whose type disagrees with the column.
pub(crate) fn check_type<T: ColumnValue>(ndx: usize, actual: DataType) -> TableResult<()> {
    if T::DATA_TYPE == actual {
        Ok(())
    } else {
        Err(TableError::TypeMismatch {
            ndx,
            expected: T::DATA_TYPE,
            actual,
        })
    }
}

/// Decode the cell of column `ndx`.
pub(crate) fn decode<T: ColumnValue>(ndx: usize, value: &Value) -> TableResult<T> {
    T::from_value(value).ok_or_else(|| match value.data_type() {
        None => TableError::NullValue { ndx },
        Some(actual) => TableError::TypeMismatch {
            ndx,
            expected: T::DATA_TYPE,
            actual,
        },
    })
}

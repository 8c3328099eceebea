//! Row mapping traits and utilities

use crate::error::{OrmError, OrmResult};
use crate::value::{FromValue, Value};

/// A driver-neutral result row.
///
/// Column labels are the member names the query visitor reported in its
/// reader fields, so entities decode by member name regardless of how the
/// database folded the case of select-list aliases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from column labels and values.
    ///
    /// Extra labels or values beyond the shorter of the two are dropped.
    pub fn new(mut columns: Vec<String>, mut values: Vec<Value>) -> Self {
        let len = columns.len().min(values.len());
        columns.truncate(len);
        values.truncate(len);
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value for a column label.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column || c.eq_ignore_ascii_case(column))
            .map(|idx| &self.values[idx])
    }

    /// Typed value for a column label.
    pub fn get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .get_value(column)
            .ok_or_else(|| OrmError::decode(column, "column not found in row"))?;
        T::from_value(value).map_err(|e| match e {
            OrmError::Decode { message, .. } => OrmError::decode(column, message),
            other => other,
        })
    }

    /// Typed value by position.
    pub fn get_by_index<T: FromValue>(&self, idx: usize) -> OrmResult<T> {
        let value = self.values.get(idx).ok_or_else(|| {
            OrmError::decode(
                idx.to_string(),
                format!("index out of bounds (row has {} columns)", self.values.len()),
            )
        })?;
        T::from_value(value)
    }

    /// Replace column labels positionally, keeping values.
    pub(crate) fn relabel(&mut self, labels: &[String]) {
        for (column, label) in self.columns.iter_mut().zip(labels) {
            column.clone_from(label);
        }
    }
}

/// Trait for types that can be constructed from a [`Row`].
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> OrmResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(row.clone())
    }
}

macro_rules! impl_scalar_from_row {
    ($($ty:ty),*) => {
        $(
            impl FromRow for $ty {
                fn from_row(row: &Row) -> OrmResult<Self> {
                    row.get_by_index(0)
                }
            }
        )*
    };
}

impl_scalar_from_row!(i32, i64, f64, bool, String, Value);

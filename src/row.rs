//! Result rows.

use std::ops::Index;

use crate::error::{Error, Result};
use crate::protocol::backend::DataRow;
use crate::value::PgValue;

/// One row of a result set: an ordered sequence of column values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    values: Vec<PgValue>,
}

impl Row {
    /// Decode a DataRow frame into owned values, validating UTF-8.
    pub(crate) fn from_data_row(row: DataRow<'_>) -> Result<Self> {
        let mut values = Vec::with_capacity(row.len());
        for column in row.iter() {
            match column? {
                None => values.push(PgValue::null()),
                Some(bytes) => {
                    let text = simdutf8::compat::from_utf8(bytes).map_err(|e| {
                        Error::Protocol(format!("invalid UTF-8 in column value: {}", e))
                    })?;
                    values.push(PgValue::from_text(text));
                }
            }
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All column values in order.
    pub fn columns(&self) -> &[PgValue] {
        &self.values
    }

    /// A column value by index, `None` when out of range.
    pub fn get(&self, index: usize) -> Option<&PgValue> {
        self.values.get(index)
    }

    pub fn into_values(self) -> Vec<PgValue> {
        self.values
    }
}

impl Index<usize> for Row {
    type Output = PgValue;

    fn index(&self, index: usize) -> &PgValue {
        &self.values[index]
    }
}

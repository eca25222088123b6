//! Assembles pages from JSON rows, one object per row.

use serde_json::Value as Json;

use crate::column::ColumnHandle;
use crate::page::{Block, Page, Value};
use crate::{Error, Result};

/// Buffers rows column-wise until a page's worth has been collected.
///
/// Fields are looked up by column name; absent fields read as null and
/// unknown fields are ignored.
pub struct PageBuilder {
    columns: Vec<ColumnHandle>,
    values: Vec<Vec<Value>>,
    rows: usize,
    batch_size: usize,
}

impl PageBuilder {
    pub fn new(columns: &[ColumnHandle], batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            columns: columns.to_vec(),
            values: columns.iter().map(|_| Vec::with_capacity(batch_size)).collect(),
            rows: 0,
            batch_size,
        }
    }

    pub fn push_line(&mut self, line: &str) -> Result<()> {
        let row: Json = serde_json::from_str(line)?;
        self.push_json(&row)
    }

    /// Adds one row. A row that fails to convert leaves the builder unchanged.
    pub fn push_json(&mut self, row: &Json) -> Result<()> {
        let object = row.as_object().ok_or_else(|| Error::InvalidPage {
            message: format!("expected a JSON object per row, got {}", row),
        })?;

        let converted = self
            .columns
            .iter()
            .map(|column| {
                let field = object.get(&column.name).unwrap_or(&Json::Null);
                Value::from_json(field, column.column_type).map_err(|e| Error::InvalidPage {
                    message: format!("column '{}': {}", column.name, e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for (column_values, value) in self.values.iter_mut().zip(converted) {
            column_values.push(value);
        }
        self.rows += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn is_full(&self) -> bool {
        self.rows >= self.batch_size
    }

    /// Returns the buffered rows as a page and starts a new one.
    pub fn build(&mut self) -> Result<Page> {
        let blocks = self
            .columns
            .iter()
            .zip(self.values.iter_mut())
            .map(|(column, values)| {
                let values = std::mem::replace(values, Vec::with_capacity(self.batch_size));
                Block::new(column.column_type, values)
            })
            .collect::<Result<Vec<_>>>()?;
        self.rows = 0;
        Page::new(blocks)
    }
}

use super::{ColumnCursor, EncoderColumn, RowEncoder, CSV_FORMAT};
use crate::page::{Block, ColumnType, Value};
use crate::{Error, Result};

const SEPARATOR: char = ',';
const QUOTE: char = '"';

/// Encodes a row as a single CSV line without a trailing line break.
pub struct CsvRowEncoder {
    cursor: ColumnCursor,
    fields: Vec<String>,
}

impl CsvRowEncoder {
    pub fn new(columns: Vec<EncoderColumn>) -> Result<Self> {
        let cursor = ColumnCursor::new(CSV_FORMAT, columns);

        for column in cursor.columns() {
            let supported = matches!(
                column.column_type,
                ColumnType::Boolean | ColumnType::Real | ColumnType::Double | ColumnType::Varchar
            ) || column.column_type.is_integral();
            if !supported {
                return Err(cursor.unsupported(column));
            }
            if column.mapping.is_some() || column.data_format.is_some() {
                return Err(Error::Config(format!(
                    "Column '{}': csv encoder does not support mapping or data format",
                    column.name
                )));
            }
        }

        let capacity = cursor.columns().len();
        Ok(Self {
            cursor,
            fields: Vec::with_capacity(capacity),
        })
    }
}

impl RowEncoder for CsvRowEncoder {
    fn append_column_value(&mut self, block: &Block, position: usize) -> Result<()> {
        self.cursor.advance(block)?;

        let field = match block.value(position)? {
            Value::Null => String::new(),
            Value::Boolean(v) => v.to_string(),
            Value::TinyInt(v) => v.to_string(),
            Value::SmallInt(v) => v.to_string(),
            Value::Integer(v) => v.to_string(),
            Value::BigInt(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Varchar(v) => v.clone(),
            other => {
                return Err(Error::encoding(format!(
                    "csv encoder cannot write {:?}",
                    other
                )))
            }
        };

        self.fields.push(field);
        Ok(())
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let fields = std::mem::take(&mut self.fields);
        self.cursor.finish_row()?;

        let line = fields
            .iter()
            .map(|f| escape(f))
            .collect::<Vec<_>>()
            .join(&SEPARATOR.to_string());
        Ok(line.into_bytes())
    }

    fn clear(&mut self) {
        self.cursor.reset();
        self.fields.clear();
    }
}

fn escape(field: &str) -> String {
    let needs_quotes = field
        .chars()
        .any(|c| c == SEPARATOR || c == QUOTE || c == '\n' || c == '\r');
    if !needs_quotes {
        return field.to_string();
    }

    let mut quoted = String::with_capacity(field.len() + 2);
    quoted.push(QUOTE);
    for c in field.chars() {
        if c == QUOTE {
            quoted.push(QUOTE);
        }
        quoted.push(c);
    }
    quoted.push(QUOTE);
    quoted
}

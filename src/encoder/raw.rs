use bytes::BufMut;

use super::{ColumnCursor, EncoderColumn, RowEncoder, RAW_FORMAT};
use crate::page::{Block, ColumnType, Value};
use crate::{Error, Result};

/// Binary representation of one raw field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Bytes,
}

impl FieldType {
    fn parse(name: &str) -> Option<Self> {
        let field_type = match name.to_ascii_uppercase().as_str() {
            "BYTE" => FieldType::Byte,
            "SHORT" => FieldType::Short,
            "INT" => FieldType::Int,
            "LONG" => FieldType::Long,
            "FLOAT" => FieldType::Float,
            "DOUBLE" => FieldType::Double,
            "BYTES" => FieldType::Bytes,
            _ => return None,
        };
        Some(field_type)
    }

    fn default_for(column_type: ColumnType) -> Option<Self> {
        let field_type = match column_type {
            ColumnType::Boolean | ColumnType::TinyInt => FieldType::Byte,
            ColumnType::SmallInt => FieldType::Short,
            ColumnType::Integer => FieldType::Int,
            ColumnType::BigInt => FieldType::Long,
            ColumnType::Real => FieldType::Float,
            ColumnType::Double => FieldType::Double,
            ColumnType::Varchar | ColumnType::Varbinary => FieldType::Bytes,
            ColumnType::Date | ColumnType::Timestamp => return None,
        };
        Some(field_type)
    }

    fn accepts(self, column_type: ColumnType) -> bool {
        match self {
            FieldType::Byte | FieldType::Short | FieldType::Int | FieldType::Long => {
                column_type.is_integral() || column_type == ColumnType::Boolean
            }
            FieldType::Float | FieldType::Double => {
                matches!(column_type, ColumnType::Real | ColumnType::Double)
            }
            FieldType::Bytes => matches!(column_type, ColumnType::Varchar | ColumnType::Varbinary),
        }
    }

    fn width(self) -> Option<usize> {
        match self {
            FieldType::Byte => Some(1),
            FieldType::Short => Some(2),
            FieldType::Int | FieldType::Float => Some(4),
            FieldType::Long | FieldType::Double => Some(8),
            FieldType::Bytes => None,
        }
    }
}

#[derive(Debug, Clone)]
struct FieldLayout {
    field_type: FieldType,
    start: Option<usize>,
    end: Option<usize>,
}

impl FieldLayout {
    fn new(column: &EncoderColumn) -> Result<Self> {
        let field_type = match column.data_format.as_deref() {
            Some(name) => FieldType::parse(name).ok_or_else(|| {
                Error::Config(format!(
                    "Unknown raw data format '{}' for column '{}'",
                    name, column.name
                ))
            })?,
            None => FieldType::default_for(column.column_type).ok_or_else(|| {
                Error::UnsupportedColumnType {
                    format: RAW_FORMAT.to_string(),
                    column: column.name.clone(),
                    column_type: column.column_type,
                }
            })?,
        };

        if !field_type.accepts(column.column_type) {
            return Err(Error::UnsupportedColumnType {
                format: RAW_FORMAT.to_string(),
                column: column.name.clone(),
                column_type: column.column_type,
            });
        }

        let (start, end) = match column.mapping.as_deref() {
            Some(mapping) => parse_mapping(mapping, &column.name)?,
            None => (None, None),
        };

        if let (Some(start), Some(end), Some(width)) = (start, end, field_type.width()) {
            if end - start != width {
                return Err(Error::Config(format!(
                    "Column '{}' maps {} bytes but its data format needs {}",
                    column.name,
                    end - start,
                    width
                )));
            }
        }

        Ok(Self {
            field_type,
            start,
            end,
        })
    }
}

/// Parses a `start[:end]` byte range.
fn parse_mapping(mapping: &str, column: &str) -> Result<(Option<usize>, Option<usize>)> {
    let invalid = || {
        Error::Config(format!(
            "Invalid raw mapping '{}' for column '{}', expected start[:end]",
            mapping, column
        ))
    };

    let mut parts = mapping.splitn(2, ':');
    let start = parts
        .next()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .ok_or_else(invalid)?;
    let end = match parts.next() {
        Some(s) => Some(s.trim().parse::<usize>().map_err(|_| invalid())?),
        None => None,
    };

    if end.is_some_and(|end| end <= start) {
        return Err(invalid());
    }
    Ok((Some(start), end))
}

/// Encodes a row into a fixed binary layout of big-endian fields.
///
/// Fields without a mapping follow the previous field. Gaps are zero filled.
pub struct RawRowEncoder {
    cursor: ColumnCursor,
    layouts: Vec<FieldLayout>,
    buffer: Vec<u8>,
}

impl RawRowEncoder {
    pub fn new(columns: Vec<EncoderColumn>) -> Result<Self> {
        let cursor = ColumnCursor::new(RAW_FORMAT, columns);
        let layouts = cursor
            .columns()
            .iter()
            .map(FieldLayout::new)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            cursor,
            layouts,
            buffer: Vec::new(),
        })
    }
}

impl RowEncoder for RawRowEncoder {
    fn append_column_value(&mut self, block: &Block, position: usize) -> Result<()> {
        let (index, column) = self.cursor.advance(block)?;
        let layout = &self.layouts[index];

        let mut encoded = Vec::with_capacity(layout.field_type.width().unwrap_or(16));
        match (layout.field_type, block.value(position)?) {
            (_, Value::Null) => {
                return Err(Error::encoding(format!(
                    "raw encoder cannot write null for column '{}'",
                    column.name
                )))
            }
            (FieldType::Float, Value::Real(v)) => encoded.put_f32(*v),
            (FieldType::Float, Value::Double(v)) => encoded.put_f32(*v as f32),
            (FieldType::Double, Value::Real(v)) => encoded.put_f64(f64::from(*v)),
            (FieldType::Double, Value::Double(v)) => encoded.put_f64(*v),
            (FieldType::Bytes, Value::Varchar(v)) => encoded.put_slice(v.as_bytes()),
            (FieldType::Bytes, Value::Varbinary(v)) => encoded.put_slice(v),
            (field_type, value) => {
                let n = match value {
                    Value::Boolean(b) => i64::from(*b),
                    other => other.as_i64().ok_or_else(|| {
                        Error::encoding(format!(
                            "raw encoder cannot write {:?} as {:?}",
                            other, field_type
                        ))
                    })?,
                };
                let overflow = || {
                    Error::encoding(format!(
                        "value {} of column '{}' does not fit in {:?}",
                        n, column.name, field_type
                    ))
                };
                match field_type {
                    FieldType::Byte => encoded.put_i8(i8::try_from(n).map_err(|_| overflow())?),
                    FieldType::Short => encoded.put_i16(i16::try_from(n).map_err(|_| overflow())?),
                    FieldType::Int => encoded.put_i32(i32::try_from(n).map_err(|_| overflow())?),
                    FieldType::Long => encoded.put_i64(n),
                    _ => return Err(overflow()),
                }
            }
        }

        let start = layout.start.unwrap_or(self.buffer.len());
        if let Some(end) = layout.end {
            if encoded.len() > end - start {
                return Err(Error::encoding(format!(
                    "value of column '{}' is {} bytes, mapping allows {}",
                    column.name,
                    encoded.len(),
                    end - start
                )));
            }
        }

        let field_end = layout.end.unwrap_or(start + encoded.len());
        if self.buffer.len() < field_end {
            self.buffer.resize(field_end, 0);
        }
        self.buffer[start..start + encoded.len()].copy_from_slice(&encoded);
        Ok(())
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let buffer = std::mem::take(&mut self.buffer);
        self.cursor.finish_row()?;
        Ok(buffer)
    }

    fn clear(&mut self) {
        self.cursor.reset();
        self.buffer.clear();
    }
}

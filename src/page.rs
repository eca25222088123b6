//! Columnar page model consumed by the sink.
//!
//! A [`Page`] is a set of equally sized [`Block`]s, one per channel. The
//! values at the same position across all blocks form one row.

use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Varchar,
    Varbinary,
    Date,
    Timestamp,
}

impl ColumnType {
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::Timestamp)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Boolean => "boolean",
            ColumnType::TinyInt => "tinyint",
            ColumnType::SmallInt => "smallint",
            ColumnType::Integer => "integer",
            ColumnType::BigInt => "bigint",
            ColumnType::Real => "real",
            ColumnType::Double => "double",
            ColumnType::Varchar => "varchar",
            ColumnType::Varbinary => "varbinary",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// A single typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Varchar(String),
    Varbinary(Bytes),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Returns the type of this value, or `None` for [`Value::Null`].
    pub fn column_type(&self) -> Option<ColumnType> {
        let column_type = match self {
            Value::Null => return None,
            Value::Boolean(_) => ColumnType::Boolean,
            Value::TinyInt(_) => ColumnType::TinyInt,
            Value::SmallInt(_) => ColumnType::SmallInt,
            Value::Integer(_) => ColumnType::Integer,
            Value::BigInt(_) => ColumnType::BigInt,
            Value::Real(_) => ColumnType::Real,
            Value::Double(_) => ColumnType::Double,
            Value::Varchar(_) => ColumnType::Varchar,
            Value::Varbinary(_) => ColumnType::Varbinary,
            Value::Date(_) => ColumnType::Date,
            Value::Timestamp(_) => ColumnType::Timestamp,
        };
        Some(column_type)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Widens any integral value to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Integer(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Converts a JSON value into a value of the given column type.
    ///
    /// Varbinary is read from a base64 string; dates and timestamps are read
    /// from ISO-8601 strings or, for timestamps, epoch milliseconds.
    pub fn from_json(json: &serde_json::Value, column_type: ColumnType) -> Result<Self> {
        use serde_json::Value as Json;

        if json.is_null() {
            return Ok(Value::Null);
        }

        let mismatch = || Error::encoding(format!("cannot read {} as {}", json, column_type));

        let value = match column_type {
            ColumnType::Boolean => Value::Boolean(json.as_bool().ok_or_else(mismatch)?),
            ColumnType::TinyInt => {
                let v = json.as_i64().ok_or_else(mismatch)?;
                Value::TinyInt(i8::try_from(v).map_err(|_| mismatch())?)
            }
            ColumnType::SmallInt => {
                let v = json.as_i64().ok_or_else(mismatch)?;
                Value::SmallInt(i16::try_from(v).map_err(|_| mismatch())?)
            }
            ColumnType::Integer => {
                let v = json.as_i64().ok_or_else(mismatch)?;
                Value::Integer(i32::try_from(v).map_err(|_| mismatch())?)
            }
            ColumnType::BigInt => Value::BigInt(json.as_i64().ok_or_else(mismatch)?),
            ColumnType::Real => Value::Real(json.as_f64().ok_or_else(mismatch)? as f32),
            ColumnType::Double => Value::Double(json.as_f64().ok_or_else(mismatch)?),
            ColumnType::Varchar => match json {
                Json::String(s) => Value::Varchar(s.clone()),
                other => Value::Varchar(other.to_string()),
            },
            ColumnType::Varbinary => {
                let text = json.as_str().ok_or_else(mismatch)?;
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(text)
                    .map_err(|e| Error::encoding(format!("invalid base64 value: {}", e)))?;
                Value::Varbinary(Bytes::from(decoded))
            }
            ColumnType::Date => {
                let text = json.as_str().ok_or_else(mismatch)?;
                let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map_err(|e| Error::encoding(format!("invalid date '{}': {}", text, e)))?;
                Value::Date(date)
            }
            ColumnType::Timestamp => match json {
                Json::Number(n) => {
                    let millis = n.as_i64().ok_or_else(mismatch)?;
                    let ts = DateTime::from_timestamp_millis(millis).ok_or_else(mismatch)?;
                    Value::Timestamp(ts.naive_utc())
                }
                Json::String(text) => Value::Timestamp(parse_timestamp(text)?),
                _ => return Err(mismatch()),
            },
        };

        Ok(value)
    }
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.naive_utc());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| Error::encoding(format!("invalid timestamp '{}': {}", text, e)))
}

/// One column of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    column_type: ColumnType,
    values: Vec<Value>,
}

impl Block {
    /// Creates a block, rejecting values that are neither null nor of `column_type`.
    pub fn new(column_type: ColumnType, values: Vec<Value>) -> Result<Self> {
        if let Some((position, value)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| v.column_type().is_some_and(|t| t != column_type))
        {
            return Err(Error::InvalidPage {
                message: format!(
                    "value {:?} at position {} does not match block type {}",
                    value, position, column_type
                ),
            });
        }

        Ok(Self {
            column_type,
            values,
        })
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn position_count(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }

    /// Like [`Block::get`], but reports an out of range position as an encoding error.
    pub fn value(&self, position: usize) -> Result<&Value> {
        self.values.get(position).ok_or_else(|| {
            Error::encoding(format!(
                "position {} out of range for block of {} values",
                position,
                self.values.len()
            ))
        })
    }

    pub fn is_null(&self, position: usize) -> bool {
        self.get(position).map_or(true, Value::is_null)
    }
}

/// A batch of rows stored column-wise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    blocks: Vec<Block>,
    position_count: usize,
}

impl Page {
    /// Creates a page from blocks that must all hold the same number of positions.
    pub fn new(blocks: Vec<Block>) -> Result<Self> {
        let position_count = blocks.first().map_or(0, Block::position_count);

        if let Some((channel, block)) = blocks
            .iter()
            .enumerate()
            .find(|(_, b)| b.position_count() != position_count)
        {
            return Err(Error::InvalidPage {
                message: format!(
                    "block {} has {} positions, expected {}",
                    channel,
                    block.position_count(),
                    position_count
                ),
            });
        }

        Ok(Self {
            blocks,
            position_count,
        })
    }

    /// A page with no channels and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn position_count(&self) -> usize {
        self.position_count
    }

    pub fn channel_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, channel: usize) -> Option<&Block> {
        self.blocks.get(channel)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.position_count == 0
    }
}

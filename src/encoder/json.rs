use base64::Engine;
use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value as Json};

use super::{ColumnCursor, EncoderColumn, RowEncoder, JSON_FORMAT};
use crate::page::{Block, Value};
use crate::{Error, Result};

/// How date and timestamp columns are rendered.
#[derive(Debug, Clone, PartialEq)]
enum TemporalFormat {
    Iso8601,
    Rfc2822,
    MillisecondsSinceEpoch,
    SecondsSinceEpoch,
    Custom(String),
}

impl TemporalFormat {
    fn parse(column: &EncoderColumn) -> Result<Self> {
        let format = match column.data_format.as_deref() {
            None | Some("iso8601") => TemporalFormat::Iso8601,
            Some("rfc2822") => TemporalFormat::Rfc2822,
            Some("milliseconds-since-epoch") => TemporalFormat::MillisecondsSinceEpoch,
            Some("seconds-since-epoch") => TemporalFormat::SecondsSinceEpoch,
            Some("custom-date-time") => {
                let hint = column.format_hint.as_deref().ok_or_else(|| {
                    Error::Config(format!(
                        "Column '{}' uses custom-date-time without a format hint",
                        column.name
                    ))
                })?;
                if StrftimeItems::new(hint).any(|item| matches!(item, Item::Error)) {
                    return Err(Error::Config(format!(
                        "Invalid date-time format hint '{}' for column '{}'",
                        hint, column.name
                    )));
                }
                TemporalFormat::Custom(hint.to_string())
            }
            Some(other) => {
                return Err(Error::Config(format!(
                    "Unknown data format '{}' for column '{}'",
                    other, column.name
                )))
            }
        };
        Ok(format)
    }

    fn render(&self, ts: NaiveDateTime, date_only: bool) -> Json {
        match self {
            TemporalFormat::Iso8601 if date_only => Json::String(ts.format("%Y-%m-%d").to_string()),
            TemporalFormat::Iso8601 => {
                Json::String(ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
            }
            TemporalFormat::Rfc2822 => Json::String(ts.and_utc().to_rfc2822()),
            TemporalFormat::MillisecondsSinceEpoch => {
                Json::Number(Number::from(ts.and_utc().timestamp_millis()))
            }
            TemporalFormat::SecondsSinceEpoch => {
                Json::Number(Number::from(ts.and_utc().timestamp()))
            }
            TemporalFormat::Custom(pattern) => Json::String(ts.format(pattern).to_string()),
        }
    }
}

/// Encodes a row as a flat JSON object keyed by column mapping or name.
pub struct JsonRowEncoder {
    cursor: ColumnCursor,
    formats: Vec<Option<TemporalFormat>>,
    node: Map<String, Json>,
}

impl JsonRowEncoder {
    pub fn new(columns: Vec<EncoderColumn>) -> Result<Self> {
        let cursor = ColumnCursor::new(JSON_FORMAT, columns);

        let mut formats = Vec::with_capacity(cursor.columns().len());
        for column in cursor.columns() {
            if column.column_type.is_temporal() {
                formats.push(Some(TemporalFormat::parse(column)?));
            } else if let Some(data_format) = &column.data_format {
                return Err(Error::Config(format!(
                    "Data format '{}' is not supported for {} column '{}'",
                    data_format, column.column_type, column.name
                )));
            } else {
                formats.push(None);
            }
        }

        Ok(Self {
            cursor,
            formats,
            node: Map::new(),
        })
    }
}

impl RowEncoder for JsonRowEncoder {
    fn append_column_value(&mut self, block: &Block, position: usize) -> Result<()> {
        let (index, column) = self.cursor.advance(block)?;
        let value = block.value(position)?;

        let json = match value {
            Value::Null => Json::Null,
            Value::Boolean(v) => Json::Bool(*v),
            Value::TinyInt(_) | Value::SmallInt(_) | Value::Integer(_) | Value::BigInt(_) => {
                Json::Number(Number::from(value.as_i64().unwrap_or_default()))
            }
            Value::Real(v) => float_to_json(f64::from(*v), column)?,
            Value::Double(v) => float_to_json(*v, column)?,
            Value::Varchar(v) => Json::String(v.clone()),
            Value::Varbinary(v) => {
                Json::String(base64::engine::general_purpose::STANDARD.encode(v))
            }
            Value::Date(date) => {
                let format = self.formats[index].as_ref().unwrap_or(&TemporalFormat::Iso8601);
                format.render(start_of_day(*date, column)?, true)
            }
            Value::Timestamp(ts) => {
                let format = self.formats[index].as_ref().unwrap_or(&TemporalFormat::Iso8601);
                format.render(*ts, false)
            }
        };

        let field = column.mapping.clone().unwrap_or_else(|| column.name.clone());
        self.node.insert(field, json);
        Ok(())
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let node = std::mem::take(&mut self.node);
        self.cursor.finish_row()?;
        Ok(serde_json::to_vec(&Json::Object(node))?)
    }

    fn clear(&mut self) {
        self.cursor.reset();
        self.node.clear();
    }
}

fn float_to_json(v: f64, column: &EncoderColumn) -> Result<Json> {
    Number::from_f64(v).map(Json::Number).ok_or_else(|| {
        Error::encoding(format!(
            "column '{}' holds {} which has no JSON representation",
            column.name, v
        ))
    })
}

fn start_of_day(date: NaiveDate, column: &EncoderColumn) -> Result<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::encoding(format!("invalid date {} in column '{}'", date, column.name)))
}

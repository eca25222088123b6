//! Row encoders turning typed column values into Kafka key and message payloads.
//!
//! An encoder is created for a fixed list of columns. For every row the sink
//! appends exactly those columns, in order, and then calls
//! [`RowEncoder::to_bytes`], which returns the payload and resets the encoder
//! for the next row.

pub mod csv;
pub mod dummy;
pub mod json;
pub mod raw;

use crate::column::ColumnHandle;
use crate::page::{Block, ColumnType};
use crate::{Error, Result};

pub use self::csv::CsvRowEncoder;
pub use self::dummy::DummyRowEncoder;
pub use self::json::JsonRowEncoder;
pub use self::raw::RawRowEncoder;

pub const JSON_FORMAT: &str = "json";
pub const CSV_FORMAT: &str = "csv";
pub const RAW_FORMAT: &str = "raw";
pub const DUMMY_FORMAT: &str = "dummy";

pub trait RowEncoder: Send {
    /// Appends the value at `position` of `block` as the next column of the current row.
    fn append_column_value(&mut self, block: &Block, position: usize) -> Result<()>;

    /// Returns the encoded row and resets the encoder.
    fn to_bytes(&mut self) -> Result<Vec<u8>>;

    /// Drops any partially appended row.
    fn clear(&mut self);

    /// Whether this encoder produces a payload at all. When it does not, the
    /// record half it encodes is sent as absent rather than empty.
    fn writes_payload(&self) -> bool {
        true
    }
}

impl<E: RowEncoder + ?Sized> RowEncoder for Box<E> {
    fn append_column_value(&mut self, block: &Block, position: usize) -> Result<()> {
        (**self).append_column_value(block, position)
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>> {
        (**self).to_bytes()
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn writes_payload(&self) -> bool {
        (**self).writes_payload()
    }
}

/// The subset of a column handle an encoder needs.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub mapping: Option<String>,
    pub data_format: Option<String>,
    pub format_hint: Option<String>,
}

impl EncoderColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            mapping: None,
            data_format: None,
            format_hint: None,
        }
    }
}

impl From<&ColumnHandle> for EncoderColumn {
    fn from(handle: &ColumnHandle) -> Self {
        Self {
            name: handle.name.clone(),
            column_type: handle.column_type,
            mapping: handle.mapping.clone(),
            data_format: handle.data_format.clone(),
            format_hint: handle.format_hint.clone(),
        }
    }
}

/// Tracks which column of the current row an encoder expects next.
#[derive(Debug, Clone)]
pub(crate) struct ColumnCursor {
    format: &'static str,
    columns: Vec<EncoderColumn>,
    next: usize,
}

impl ColumnCursor {
    pub(crate) fn new(format: &'static str, columns: Vec<EncoderColumn>) -> Self {
        Self {
            format,
            columns,
            next: 0,
        }
    }

    pub(crate) fn columns(&self) -> &[EncoderColumn] {
        &self.columns
    }

    /// Moves to the next column, checking it against the block being appended.
    pub(crate) fn advance(&mut self, block: &Block) -> Result<(usize, &EncoderColumn)> {
        let index = self.next;
        let column = self.columns.get(index).ok_or_else(|| {
            Error::encoding(format!(
                "{} encoder received more than {} columns",
                self.format,
                self.columns.len()
            ))
        })?;

        if block.column_type() != column.column_type {
            return Err(Error::encoding(format!(
                "column '{}' expects {} but block holds {}",
                column.name,
                column.column_type,
                block.column_type()
            )));
        }

        self.next += 1;
        Ok((index, column))
    }

    /// Verifies that the row is complete and rewinds for the next one.
    pub(crate) fn finish_row(&mut self) -> Result<()> {
        let appended = self.next;
        self.next = 0;

        if appended != self.columns.len() {
            return Err(Error::encoding(format!(
                "{} encoder missing columns: received {} of {}",
                self.format,
                appended,
                self.columns.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn reset(&mut self) {
        self.next = 0;
    }

    pub(crate) fn unsupported(&self, column: &EncoderColumn) -> Error {
        Error::UnsupportedColumnType {
            format: self.format.to_string(),
            column: column.name.clone(),
            column_type: column.column_type,
        }
    }
}

/// Creates encoders by data format name.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderFactory;

impl EncoderFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn supported_formats(&self) -> &'static [&'static str] {
        &[JSON_FORMAT, CSV_FORMAT, RAW_FORMAT, DUMMY_FORMAT]
    }

    pub fn create(
        &self,
        data_format: &str,
        columns: Vec<EncoderColumn>,
    ) -> Result<Box<dyn RowEncoder>> {
        let encoder: Box<dyn RowEncoder> = match data_format {
            JSON_FORMAT => Box::new(JsonRowEncoder::new(columns)?),
            CSV_FORMAT => Box::new(CsvRowEncoder::new(columns)?),
            RAW_FORMAT => Box::new(RawRowEncoder::new(columns)?),
            DUMMY_FORMAT => Box::new(DummyRowEncoder::new(columns)?),
            other => {
                return Err(Error::Config(format!(
                    "Unknown data format '{}', expected one of {:?}",
                    other,
                    self.supported_formats()
                )))
            }
        };
        Ok(encoder)
    }
}

//! Error types and result handling for kafka-page-sink.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use kafka_page_sink::{Error, Result};
//!
//! fn finish_sink(failed: u64) -> Result<()> {
//!     if failed > 0 {
//!         return Err(Error::PublishFailure { count: failed });
//!     }
//!     Ok(())
//! }
//!
//! match finish_sink(3) {
//!     Ok(()) => println!("All records delivered"),
//!     Err(Error::PublishFailure { count }) => eprintln!("{} records were lost", count),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use crate::page::ColumnType;
use crate::sink::SinkState;
use thiserror::Error;

/// The main error type for kafka-page-sink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, typically from an invalid file or environment variable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka client or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// JSON error while encoding a payload or reading input rows.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from reading input files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A required sink input was missing or invalid.
    #[error("Invalid sink construction: {0}")]
    Construction(String),

    /// An encoder could not serialize a column value.
    #[error("Encoding error: {message}")]
    Encoding {
        /// Description of what could not be encoded
        message: String,
    },

    /// A column type that the selected data format cannot represent.
    #[error("Unsupported column type {column_type} for column '{column}' in {format} encoder")]
    UnsupportedColumnType {
        /// Data format of the encoder that rejected the column
        format: String,
        /// Name of the rejected column
        column: String,
        /// Type of the rejected column
        column_type: ColumnType,
    },

    /// A page whose shape does not match the sink's columns.
    #[error("Invalid page: {message}")]
    InvalidPage {
        /// Description of the mismatch
        message: String,
    },

    /// A lifecycle operation called in a state that does not allow it.
    #[error("Cannot {operation} a sink in state {state}")]
    InvalidState {
        /// The rejected operation
        operation: &'static str,
        /// State of the sink when the call was made
        state: SinkState,
    },

    /// One or more records were not delivered to the broker.
    ///
    /// Only the number of failed records is known; the records themselves
    /// are not identified.
    #[error("{count} producer record(s) failed to send")]
    PublishFailure {
        /// Number of records whose delivery failed
        count: u64,
    },
}

impl Error {
    pub(crate) fn encoding(message: impl Into<String>) -> Self {
        Error::Encoding {
            message: message.into(),
        }
    }
}

/// A convenient Result type alias for kafka-page-sink operations.
///
/// This is equivalent to `std::result::Result<T, kafka_page_sink::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

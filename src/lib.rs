pub mod column;
pub mod config;
pub mod encoder;
pub mod error;
pub mod input;
pub mod kafka;
pub mod page;
pub mod provider;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::SinkConfig;
pub use error::{Error, Result};
pub use provider::PageSinkProvider;
pub use sink::{KafkaPageSink, SinkState};

use tracing::{debug, instrument};

use crate::column::{ColumnHandle, ColumnRole};
use crate::config::{KafkaConfig, TopicConfig};
use crate::encoder::{EncoderColumn, EncoderFactory};
use crate::kafka::{KafkaProducerFactory, ProducerFactory};
use crate::sink::KafkaPageSink;
use crate::Result;

/// Builds sinks for configured topics.
///
/// Internal columns are never written. The remaining columns are split by
/// role into the key and message encoders, which are created from the
/// topic's data formats.
pub struct PageSinkProvider<F = KafkaProducerFactory> {
    producer_factory: F,
    encoder_factory: EncoderFactory,
}

impl PageSinkProvider<KafkaProducerFactory> {
    pub fn from_config(config: &KafkaConfig) -> Self {
        Self::new(KafkaProducerFactory::new(config.clone()))
    }
}

impl<F: ProducerFactory> PageSinkProvider<F> {
    pub fn new(producer_factory: F) -> Self {
        Self {
            producer_factory,
            encoder_factory: EncoderFactory::new(),
        }
    }

    #[instrument(skip_all, fields(topic = %topic.name))]
    pub fn create_sink(&self, topic: &TopicConfig) -> Result<KafkaPageSink> {
        let columns: Vec<ColumnHandle> = topic
            .columns
            .iter()
            .filter(|c| !c.internal)
            .cloned()
            .collect();

        let (key_columns, message_columns): (Vec<_>, Vec<_>) =
            columns.iter().partition(|c| c.role() == ColumnRole::Key);
        let key_columns: Vec<EncoderColumn> = key_columns.into_iter().map(EncoderColumn::from).collect();
        let message_columns: Vec<EncoderColumn> =
            message_columns.into_iter().map(EncoderColumn::from).collect();

        debug!(
            key_format = %topic.key_data_format,
            message_format = %topic.message_data_format,
            key_columns = key_columns.len(),
            message_columns = message_columns.len(),
            "Creating encoders"
        );

        let key_encoder = self
            .encoder_factory
            .create(&topic.key_data_format, key_columns)?;
        let message_encoder = self
            .encoder_factory
            .create(&topic.message_data_format, message_columns)?;

        KafkaPageSink::builder()
            .topic(topic.name.clone())
            .columns(columns)
            .key_encoder(key_encoder)
            .message_encoder(message_encoder)
            .build(&self.producer_factory)
    }
}

//! The publishing sink: turns pages into Kafka records.
//!
//! [`KafkaPageSink`] walks every row of a page, routes each column to the key
//! or message encoder, and hands the encoded record to the producer without
//! waiting for the broker. Delivery failures are counted in the background
//! and only surface when the sink is finished.
//!
//! # Example
//!
//! ```rust,no_run
//! use kafka_page_sink::column::{ColumnHandle, ColumnRole};
//! use kafka_page_sink::config::KafkaConfig;
//! use kafka_page_sink::encoder::{EncoderColumn, EncoderFactory};
//! use kafka_page_sink::kafka::KafkaProducerFactory;
//! use kafka_page_sink::page::{Block, ColumnType, Page, Value};
//! use kafka_page_sink::KafkaPageSink;
//!
//! # fn main() -> kafka_page_sink::Result<()> {
//! let columns = vec![
//!     ColumnHandle::new("id", ColumnType::BigInt, ColumnRole::Key),
//!     ColumnHandle::new("name", ColumnType::Varchar, ColumnRole::Value),
//! ];
//! let encoders = EncoderFactory::new();
//! let factory = KafkaProducerFactory::new(KafkaConfig::new(vec!["localhost:9092".into()]));
//!
//! let mut sink = KafkaPageSink::builder()
//!     .topic("users")
//!     .key_encoder(encoders.create("csv", vec![EncoderColumn::from(&columns[0])])?)
//!     .message_encoder(encoders.create("json", vec![EncoderColumn::from(&columns[1])])?)
//!     .columns(columns)
//!     .build(&factory)?;
//!
//! let page = Page::new(vec![
//!     Block::new(ColumnType::BigInt, vec![Value::BigInt(1)])?,
//!     Block::new(ColumnType::Varchar, vec![Value::Varchar("Ada".into())])?,
//! ])?;
//! sink.append_page(&page)?;
//! sink.finish()?;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use futures::future::{self, Ready};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::column::{ColumnClassifier, ColumnHandle, ColumnRole};
use crate::encoder::RowEncoder;
use crate::kafka::{
    DeliveryCallback, EncodedRecord, ErrorCountingCallback, ProducerFactory, RecordProducer,
};
use crate::page::Page;
use crate::{Error, Result};

/// Kafka's limit on topic name length.
const MAX_TOPIC_NAME_LENGTH: usize = 249;

/// Completion signal returned by [`KafkaPageSink::append_page`]; always ready.
pub type AppendFuture = Ready<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Open,
    Finished,
    Aborted,
}

impl fmt::Display for SinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkState::Open => "open",
            SinkState::Finished => "finished",
            SinkState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

pub struct KafkaPageSink {
    topic: String,
    columns: Vec<ColumnHandle>,
    classifier: ColumnClassifier,
    key_encoder: Box<dyn RowEncoder>,
    message_encoder: Box<dyn RowEncoder>,
    producer: Option<Box<dyn RecordProducer>>,
    error_counter: Arc<ErrorCountingCallback>,
    state: SinkState,
    records_sent: u64,
}

impl KafkaPageSink {
    pub fn builder() -> KafkaPageSinkBuilder {
        KafkaPageSinkBuilder::default()
    }

    /// Creates a sink and its producer.
    ///
    /// `columns` lists the page channels in order; it may be empty.
    pub fn new(
        topic: impl Into<String>,
        columns: Vec<ColumnHandle>,
        key_encoder: Box<dyn RowEncoder>,
        message_encoder: Box<dyn RowEncoder>,
        producer_factory: &dyn ProducerFactory,
    ) -> Result<Self> {
        let topic = topic.into();
        validate_topic_name(&topic)?;

        let classifier = ColumnClassifier::new(&columns);
        let producer = producer_factory.create()?;

        debug!(
            topic = %topic,
            columns = classifier.column_count(),
            key_columns = classifier.key_count(),
            "Created Kafka page sink"
        );

        Ok(Self {
            topic,
            columns,
            classifier,
            key_encoder,
            message_encoder,
            producer: Some(producer),
            error_counter: Arc::new(ErrorCountingCallback::new()),
            state: SinkState::Open,
            records_sent: 0,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn columns(&self) -> &[ColumnHandle] {
        &self.columns
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Records handed to the producer so far.
    pub fn records_sent(&self) -> u64 {
        self.records_sent
    }

    /// Deliveries reported as failed so far.
    pub fn failure_count(&self) -> u64 {
        self.error_counter.failure_count()
    }

    /// Encodes and submits every row of `page`, in row order.
    ///
    /// Never waits for the broker: the returned signal is already complete.
    /// An encoding error stops the page at the failing row; rows before it
    /// have already been submitted and the sink stays open.
    #[instrument(skip_all, fields(topic = %self.topic, rows = page.position_count()))]
    pub fn append_page(&mut self, page: &Page) -> Result<AppendFuture> {
        self.ensure_open("append to")?;

        if page.channel_count() != self.classifier.column_count() {
            return Err(Error::InvalidPage {
                message: format!(
                    "page has {} channels but the sink has {} columns",
                    page.channel_count(),
                    self.classifier.column_count()
                ),
            });
        }

        for position in 0..page.position_count() {
            let record = self.encode_row(page, position)?;
            self.publish(record);
        }

        debug!(records_sent = self.records_sent, "Appended page");
        Ok(future::ready(()))
    }

    /// Flushes and closes the producer, then fails if any record was not delivered.
    ///
    /// Blocks until every submitted record has been acknowledged or has
    /// failed. Returns no fragments on success.
    #[instrument(skip(self), fields(topic = %self.topic))]
    pub fn finish(&mut self) -> Result<Vec<Bytes>> {
        self.ensure_open("finish")?;
        self.state = SinkState::Finished;

        let Some(producer) = self.producer.take() else {
            return Err(Error::InvalidState {
                operation: "finish",
                state: self.state,
            });
        };

        debug!(in_flight = producer.in_flight_count(), "Flushing Kafka producer");
        let flushed = producer.flush();
        producer.close();
        flushed?;

        let failures = self.error_counter.failure_count();
        if failures > 0 {
            warn!(
                failures,
                records_sent = self.records_sent,
                "Kafka page sink finished with failed records"
            );
            return Err(Error::PublishFailure { count: failures });
        }

        info!(records_sent = self.records_sent, "Kafka page sink finished");
        Ok(Vec::new())
    }

    /// Releases the producer without flushing or checking for failures.
    ///
    /// Never fails; calling it on a finished or aborted sink does nothing.
    #[instrument(skip(self), fields(topic = %self.topic))]
    pub fn abort(&mut self) {
        if self.state != SinkState::Open {
            debug!(state = %self.state, "Ignoring abort of closed sink");
            return;
        }
        self.state = SinkState::Aborted;

        if let Some(producer) = self.producer.take() {
            warn!(
                in_flight = producer.in_flight_count(),
                records_sent = self.records_sent,
                "Aborting Kafka page sink"
            );
            producer.close();
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.state != SinkState::Open {
            return Err(Error::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn encode_row(&mut self, page: &Page, position: usize) -> Result<EncodedRecord> {
        let result = self.dispatch_row(page, position);
        if result.is_err() {
            self.key_encoder.clear();
            self.message_encoder.clear();
        }
        result
    }

    fn dispatch_row(&mut self, page: &Page, position: usize) -> Result<EncodedRecord> {
        for (channel, block) in page.blocks().iter().enumerate() {
            match self.classifier.role(channel) {
                Some(ColumnRole::Key) => self.key_encoder.append_column_value(block, position)?,
                _ => self.message_encoder.append_column_value(block, position)?,
            }
        }

        let key = self.key_encoder.to_bytes()?;
        let value = self.message_encoder.to_bytes()?;
        Ok(EncodedRecord {
            key: self.key_encoder.writes_payload().then_some(key),
            value,
        })
    }

    fn publish(&mut self, record: EncodedRecord) {
        if let Some(producer) = &self.producer {
            let callback: Arc<dyn DeliveryCallback> = self.error_counter.clone();
            producer.send(&self.topic, record, callback);
            self.records_sent += 1;
        }
    }
}

impl Drop for KafkaPageSink {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            warn!(topic = %self.topic, "Kafka page sink dropped while open, closing producer");
            producer.close();
        }
    }
}

impl fmt::Debug for KafkaPageSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaPageSink")
            .field("topic", &self.topic)
            .field("columns", &self.columns.len())
            .field("state", &self.state)
            .field("records_sent", &self.records_sent)
            .field("failures", &self.error_counter.failure_count())
            .finish()
    }
}

/// Collects the sink's inputs and reports the first missing one.
#[derive(Default)]
pub struct KafkaPageSinkBuilder {
    topic: Option<String>,
    columns: Option<Vec<ColumnHandle>>,
    key_encoder: Option<Box<dyn RowEncoder>>,
    message_encoder: Option<Box<dyn RowEncoder>>,
}

impl KafkaPageSinkBuilder {
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn columns(mut self, columns: Vec<ColumnHandle>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn key_encoder(mut self, encoder: Box<dyn RowEncoder>) -> Self {
        self.key_encoder = Some(encoder);
        self
    }

    pub fn message_encoder(mut self, encoder: Box<dyn RowEncoder>) -> Self {
        self.message_encoder = Some(encoder);
        self
    }

    pub fn build(self, producer_factory: &dyn ProducerFactory) -> Result<KafkaPageSink> {
        let missing = |what: &str| Error::Construction(format!("{} is missing", what));

        KafkaPageSink::new(
            self.topic.ok_or_else(|| missing("topic"))?,
            self.columns.ok_or_else(|| missing("columns"))?,
            self.key_encoder.ok_or_else(|| missing("key encoder"))?,
            self.message_encoder.ok_or_else(|| missing("message encoder"))?,
            producer_factory,
        )
    }
}

fn validate_topic_name(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(Error::Construction("topic name is empty".to_string()));
    }
    if topic.len() > MAX_TOPIC_NAME_LENGTH {
        return Err(Error::Construction(format!(
            "topic name is longer than {} characters",
            MAX_TOPIC_NAME_LENGTH
        )));
    }
    if topic == "." || topic == ".." {
        return Err(Error::Construction(format!("'{}' is not a valid topic name", topic)));
    }
    if let Some(c) = topic
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(Error::Construction(format!(
            "topic name '{}' contains illegal character '{}'",
            topic, c
        )));
    }
    Ok(())
}

use crate::kafka::callback::{DeliveryCallback, PublishOutcome};
use crate::{config::KafkaConfig, Result};
use rdkafka::client::ClientContext;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Pause between attempts to enqueue while the local queue is full.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// Serialized key and value of one row. A record without a key is
/// partitioned by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedRecord {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

/// Fire-and-forget record sender.
///
/// `send` never reports errors directly: every record, including one the
/// client refuses to enqueue, is reported exactly once through its callback.
/// It may block while the client's local queue is full.
pub trait RecordProducer: Send {
    fn send(&self, topic: &str, record: EncodedRecord, callback: Arc<dyn DeliveryCallback>);

    /// Number of records submitted but not yet reported.
    fn in_flight_count(&self) -> usize;

    /// Blocks until every submitted record has been reported.
    fn flush(&self) -> Result<()>;

    /// Releases the client. Consuming the box makes a second close impossible.
    fn close(self: Box<Self>);
}

/// Creates ready-to-use producers for new sinks.
pub trait ProducerFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn RecordProducer>>;
}

/// Routes librdkafka delivery reports to the callback attached to each record.
pub struct SinkProducerContext;

impl ClientContext for SinkProducerContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => error!(target: "librdkafka", fac, "{}", log_message),
            RDKafkaLogLevel::Warning => warn!(target: "librdkafka", fac, "{}", log_message),
            RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => {
                info!(target: "librdkafka", fac, "{}", log_message)
            }
            RDKafkaLogLevel::Debug => debug!(target: "librdkafka", fac, "{}", log_message),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        error!(%error, reason, "Kafka client error");
    }
}

impl ProducerContext for SinkProducerContext {
    type DeliveryOpaque = Box<Arc<dyn DeliveryCallback>>;

    fn delivery(&self, result: &DeliveryResult<'_>, callback: Self::DeliveryOpaque) {
        let outcome = match result {
            Ok(_) => PublishOutcome::Delivered,
            Err((e, _)) => PublishOutcome::Failed(e.to_string()),
        };
        callback.on_completion(outcome);
    }
}

pub struct KafkaProducer {
    producer: ThreadedProducer<SinkProducerContext>,
    flush_timeout: Timeout,
    max_block: Duration,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: ThreadedProducer<SinkProducerContext> =
            client_config(config).create_with_context(SinkProducerContext)?;

        let flush_timeout = match config.flush_timeout_ms {
            Some(ms) => Timeout::After(Duration::from_millis(ms)),
            None => Timeout::Never,
        };

        debug!(brokers = ?config.brokers, "Created Kafka producer");
        Ok(Self {
            producer,
            flush_timeout,
            max_block: Duration::from_millis(config.max_block_ms),
        })
    }
}

impl RecordProducer for KafkaProducer {
    fn send(&self, topic: &str, record: EncodedRecord, callback: Arc<dyn DeliveryCallback>) {
        let mut base = BaseRecord::with_opaque_to(topic, Box::new(callback)).payload(&record.value[..]);
        if let Some(key) = &record.key {
            base = base.key(&key[..]);
        }

        match send_with_backoff(base, self.max_block, |r| self.producer.send(r)) {
            Ok(()) => trace!(topic, "Queued record"),
            Err((error, rejected)) => {
                warn!(%error, topic, "Kafka producer rejected record");
                rejected
                    .delivery_opaque
                    .on_completion(PublishOutcome::Failed(error.to_string()));
            }
        }
    }

    fn in_flight_count(&self) -> usize {
        usize::try_from(self.producer.in_flight_count()).unwrap_or(0)
    }

    fn flush(&self) -> Result<()> {
        self.producer.flush(self.flush_timeout)?;
        Ok(())
    }

    fn close(self: Box<Self>) {
        debug!(in_flight = self.in_flight_count(), "Closing Kafka producer");
        drop(self);
    }
}

/// Builds [`KafkaProducer`]s from a shared configuration.
#[derive(Debug, Clone)]
pub struct KafkaProducerFactory {
    config: KafkaConfig,
}

impl KafkaProducerFactory {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }
}

impl ProducerFactory for KafkaProducerFactory {
    fn create(&self) -> Result<Box<dyn RecordProducer>> {
        Ok(Box::new(KafkaProducer::new(&self.config)?))
    }
}

/// Retries `try_send` while the local queue is full, for at most `max_block`.
///
/// Any other error, or a queue that stays full past the deadline, hands the
/// record back with the last error.
pub(crate) fn send_with_backoff<R>(
    mut record: R,
    max_block: Duration,
    mut try_send: impl FnMut(R) -> std::result::Result<(), (KafkaError, R)>,
) -> std::result::Result<(), (KafkaError, R)> {
    let deadline = Instant::now() + max_block;
    loop {
        match try_send(record) {
            Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), rejected))
                if Instant::now() < deadline =>
            {
                record = rejected;
                thread::sleep(QUEUE_FULL_BACKOFF);
            }
            result => return result,
        }
    }
}

pub(crate) fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", config.brokers.join(","))
        .set("client.id", &config.client_id)
        .set("compression.type", &config.compression)
        .set("acks", &config.acks)
        .set("linger.ms", config.linger_ms.to_string())
        .set("batch.size", config.batch_size.to_string())
        .set(
            "queue.buffering.max.kbytes",
            (config.buffer_memory / 1024).max(1).to_string(),
        )
        .set("message.timeout.ms", config.message_timeout_ms.to_string())
        .set_log_level(RDKafkaLogLevel::Warning);

    for (key, value) in &config.properties {
        client_config.set(key, value);
    }
    client_config
}

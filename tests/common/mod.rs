#![allow(dead_code)]

use kafka_page_sink::column::{ColumnHandle, ColumnRole};
use kafka_page_sink::config::{KafkaConfig, SinkConfig, TopicConfig};
use kafka_page_sink::kafka::{
    DeliveryCallback, EncodedRecord, ProducerFactory, PublishOutcome, RecordProducer,
};
use kafka_page_sink::page::ColumnType;
use std::env;
use std::sync::{Arc, Mutex};

/// Get test configuration from environment variables
pub fn get_test_config() -> SinkConfig {
    let mut kafka = KafkaConfig::new(
        env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
    );
    kafka.compression = "none".to_string(); // No compression for tests
    kafka.linger_ms = 0; // Immediate sending for tests
    kafka.message_timeout_ms = 10_000;
    kafka.flush_timeout_ms = Some(30_000);

    let topic = TopicConfig {
        name: format!("test_{}", std::process::id()),
        key_data_format: "csv".to_string(),
        message_data_format: "json".to_string(),
        columns: vec![
            ColumnHandle::new("id", ColumnType::BigInt, ColumnRole::Key),
            ColumnHandle::new("name", ColumnType::Varchar, ColumnRole::Value),
            ColumnHandle::new("score", ColumnType::Double, ColumnRole::Value),
        ],
    };

    SinkConfig { kafka, topic }
}

/// What a [`ScriptedProducer`] has seen.
#[derive(Default)]
pub struct Journal {
    pub sent: Vec<(String, EncodedRecord)>,
    pub flushes: usize,
    pub closes: usize,
}

/// Producer factory that reports each delivery on a fresh thread as soon as
/// the record is sent, failing the records picked by `fails`.
#[derive(Clone)]
pub struct ScriptedProducerFactory {
    journal: Arc<Mutex<Journal>>,
    fails: Arc<dyn Fn(usize) -> bool + Send + Sync>,
}

impl ScriptedProducerFactory {
    pub fn new(fails: impl Fn(usize) -> bool + Send + Sync + 'static) -> Self {
        Self {
            journal: Arc::new(Mutex::new(Journal::default())),
            fails: Arc::new(fails),
        }
    }

    pub fn reliable() -> Self {
        Self::new(|_| false)
    }

    pub fn journal(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal.lock().unwrap()
    }
}

impl ProducerFactory for ScriptedProducerFactory {
    fn create(&self) -> kafka_page_sink::Result<Box<dyn RecordProducer>> {
        Ok(Box::new(ScriptedProducer {
            journal: Arc::clone(&self.journal),
            fails: Arc::clone(&self.fails),
            threads: Mutex::new(Vec::new()),
        }))
    }
}

pub struct ScriptedProducer {
    journal: Arc<Mutex<Journal>>,
    fails: Arc<dyn Fn(usize) -> bool + Send + Sync>,
    threads: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl RecordProducer for ScriptedProducer {
    fn send(&self, topic: &str, record: EncodedRecord, callback: Arc<dyn DeliveryCallback>) {
        let index = {
            let mut journal = self.journal.lock().unwrap();
            journal.sent.push((topic.to_string(), record));
            journal.sent.len() - 1
        };

        let failed = (self.fails)(index);
        let handle = std::thread::spawn(move || {
            if failed {
                callback.on_completion(PublishOutcome::Failed("scripted failure".to_string()));
            } else {
                callback.on_completion(PublishOutcome::Delivered);
            }
        });
        self.threads.lock().unwrap().push(handle);
    }

    fn in_flight_count(&self) -> usize {
        self.threads
            .lock()
            .unwrap()
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    fn flush(&self) -> kafka_page_sink::Result<()> {
        let threads = std::mem::take(&mut *self.threads.lock().unwrap());
        for handle in threads {
            handle.join().unwrap();
        }
        self.journal.lock().unwrap().flushes += 1;
        Ok(())
    }

    fn close(self: Box<Self>) {
        self.journal.lock().unwrap().closes += 1;
    }
}

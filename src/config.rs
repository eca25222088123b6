use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::column::ColumnHandle;
use crate::encoder::{DUMMY_FORMAT, JSON_FORMAT};
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    pub kafka: KafkaConfig,
    pub topic: TopicConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_buffer_memory")]
    pub buffer_memory: usize,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    /// How long a send may wait for room in the local queue before the record fails.
    #[serde(default = "default_max_block_ms")]
    pub max_block_ms: u64,
    /// Upper bound for the flush on finish; unbounded when absent.
    #[serde(default)]
    pub flush_timeout_ms: Option<u64>,
    /// Extra librdkafka properties, applied last.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopicConfig {
    pub name: String,
    #[serde(default = "default_key_data_format")]
    pub key_data_format: String,
    #[serde(default = "default_message_data_format")]
    pub message_data_format: String,
    #[serde(default)]
    pub columns: Vec<ColumnHandle>,
}

impl SinkConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("PAGE_SINK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let config: SinkConfig = settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers.is_empty() {
            return Err(Error::Config("kafka.brokers must not be empty".to_string()));
        }
        if self.topic.name.trim().is_empty() {
            return Err(Error::Config("topic.name must not be empty".to_string()));
        }
        Ok(())
    }
}

impl KafkaConfig {
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            client_id: default_client_id(),
            compression: default_compression(),
            acks: default_acks(),
            linger_ms: default_linger_ms(),
            batch_size: default_batch_size(),
            buffer_memory: default_buffer_memory(),
            message_timeout_ms: default_message_timeout_ms(),
            max_block_ms: default_max_block_ms(),
            flush_timeout_ms: None,
            properties: BTreeMap::new(),
        }
    }
}

fn default_client_id() -> String {
    "kafka-page-sink".to_string()
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_linger_ms() -> u32 {
    5
}

fn default_batch_size() -> usize {
    16384
}

fn default_buffer_memory() -> usize {
    33_554_432 // 32MB
}

fn default_message_timeout_ms() -> u64 {
    300_000
}

fn default_max_block_ms() -> u64 {
    60_000
}

fn default_key_data_format() -> String {
    DUMMY_FORMAT.to_string()
}

fn default_message_data_format() -> String {
    JSON_FORMAT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnRole;
    use crate::page::ColumnType;
    use std::io::Write;

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[kafka]
brokers = ["broker-1:9092", "broker-2:9092"]
acks = "1"

[topic]
name = "orders"
key_data_format = "csv"

[[topic.columns]]
name = "order_id"
type = "bigint"
key = true

[[topic.columns]]
name = "amount"
type = "double"
"#
        )
        .unwrap();

        let config = SinkConfig::from_file(file.path()).unwrap();

        assert_eq!(config.kafka.brokers.len(), 2);
        assert_eq!(config.kafka.acks, "1");
        assert_eq!(config.kafka.compression, "snappy");
        assert_eq!(config.kafka.flush_timeout_ms, None);
        assert_eq!(config.kafka.max_block_ms, 60_000);
        assert!(config.kafka.properties.is_empty());
        assert_eq!(config.topic.name, "orders");
        assert_eq!(config.topic.key_data_format, "csv");
        assert_eq!(config.topic.message_data_format, "json");
        assert_eq!(config.topic.columns.len(), 2);
        assert_eq!(config.topic.columns[0].role(), ColumnRole::Key);
        assert_eq!(config.topic.columns[1].column_type, ColumnType::Double);
    }

    #[test]
    fn test_validate_rejects_empty_topic() {
        let config = SinkConfig {
            kafka: KafkaConfig::new(vec!["localhost:9092".to_string()]),
            topic: TopicConfig {
                name: " ".to_string(),
                key_data_format: default_key_data_format(),
                message_data_format: default_message_data_format(),
                columns: vec![],
            },
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = SinkConfig::from_file("/nonexistent/page-sink.toml");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

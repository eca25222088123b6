mod common;

use common::get_test_config;
use kafka_page_sink::config::KafkaConfig;
use kafka_page_sink::input::PageBuilder;
use kafka_page_sink::{Error, PageSinkProvider, SinkConfig};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

#[tokio::test]
#[ignore] // Run with: cargo test --ignored integration_test::test_end_to_end_publish
async fn test_end_to_end_publish() {
    tracing_subscriber::fmt()
        .with_env_filter("kafka_page_sink=debug,rdkafka=info")
        .try_init()
        .ok();

    let config = load_test_config_file();
    let provider = PageSinkProvider::from_config(&config.kafka);
    let mut sink = provider.create_sink(&config.topic).unwrap();

    let mut builder = PageBuilder::new(sink.columns(), 2);
    for (id, name, score) in [(1, "Alice", 9.5), (2, "Bob", 7.0), (3, "Carol", 8.25)] {
        builder
            .push_json(&serde_json::json!({"id": id, "name": name, "score": score}))
            .unwrap();
        if builder.is_full() {
            sink.append_page(&builder.build().unwrap()).unwrap().await;
        }
    }
    sink.append_page(&builder.build().unwrap()).unwrap().await;

    let fragments = tokio::task::spawn_blocking(move || sink.finish())
        .await
        .unwrap()
        .unwrap();
    assert!(fragments.is_empty());

    let consumer = create_test_consumer(&config.kafka, &config.topic.name);
    let mut received = HashMap::new();

    let timeout_duration = Duration::from_secs(10);
    let start = tokio::time::Instant::now();

    while received.len() < 3 && start.elapsed() < timeout_duration {
        if let Ok(Ok(message)) = timeout(Duration::from_secs(1), consumer.recv()).await {
            let key = message
                .key()
                .map(|k| String::from_utf8_lossy(k).to_string())
                .unwrap_or_default();
            if let Some(payload) = message.payload() {
                let json: Value = serde_json::from_slice(payload).unwrap();
                info!("Received record {} => {}", key, json);

                // Key columns never appear in the message.
                assert!(json.get("id").is_none());
                received.insert(key, json);
            }
        }
    }

    assert_eq!(received.len(), 3);
    assert_eq!(received["1"]["name"], "Alice");
    assert_eq!(received["2"]["score"], 7.0);
    assert_eq!(received["3"]["name"], "Carol");
}

#[tokio::test]
#[ignore] // Run with: cargo test --ignored integration_test::test_unreachable_broker_fails_finish
async fn test_unreachable_broker_fails_finish() {
    let mut config = get_test_config();
    config.kafka.brokers = vec!["localhost:1".to_string()];
    config.kafka.message_timeout_ms = 1000;

    let provider = PageSinkProvider::from_config(&config.kafka);
    let mut sink = provider.create_sink(&config.topic).unwrap();

    let mut builder = PageBuilder::new(sink.columns(), 10);
    for i in 0..5 {
        builder
            .push_json(&serde_json::json!({"id": i, "name": "nobody"}))
            .unwrap();
    }
    sink.append_page(&builder.build().unwrap()).unwrap().await;

    let result = tokio::task::spawn_blocking(move || sink.finish())
        .await
        .unwrap();

    match result {
        Err(Error::PublishFailure { count }) => assert_eq!(count, 5),
        other => panic!("expected publish failure, got {:?}", other),
    }
}

// Helper functions

fn load_test_config_file() -> SinkConfig {
    let defaults = get_test_config();
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
[kafka]
brokers = [{brokers}]
compression = "none"
linger_ms = 0
flush_timeout_ms = 30000

[topic]
name = "{topic}"
key_data_format = "csv"
message_data_format = "json"

[[topic.columns]]
name = "id"
type = "bigint"
key = true

[[topic.columns]]
name = "name"
type = "varchar"

[[topic.columns]]
name = "score"
type = "double"

[[topic.columns]]
name = "_offset"
type = "bigint"
internal = true
"#,
        brokers = defaults
            .kafka
            .brokers
            .iter()
            .map(|b| format!("\"{}\"", b))
            .collect::<Vec<_>>()
            .join(", "),
        topic = defaults.topic.name,
    )
    .unwrap();

    SinkConfig::from_file(file.path()).expect("Failed to load test config")
}

fn create_test_consumer(kafka_config: &KafkaConfig, topic: &str) -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", kafka_config.brokers.join(","))
        .set("group.id", format!("test_consumer_{}", std::process::id()))
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .create()
        .expect("Failed to create consumer");

    consumer
        .subscribe(&[topic])
        .expect("Failed to subscribe to topic");

    consumer
}

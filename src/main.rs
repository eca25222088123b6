use anyhow::Context;
use clap::Parser;
use kafka_page_sink::input::PageBuilder;
use kafka_page_sink::{KafkaPageSink, PageSinkProvider, SinkConfig};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "kafka-page-sink")]
#[command(about = "Publish JSON rows to a Kafka topic through the page sink", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "sink.toml")]
    config: PathBuf,

    #[arg(short, long, value_name = "FILE", help = "Newline-delimited JSON rows")]
    input: PathBuf,

    #[arg(short, long, default_value_t = 1000, help = "Rows per page")]
    batch_size: usize,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Loading configuration from {:?}", args.config);
    let config = SinkConfig::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;

    info!(
        kafka_brokers = ?config.kafka.brokers,
        topic = %config.topic.name,
        key_format = %config.topic.key_data_format,
        message_format = %config.topic.message_data_format,
        columns = config.topic.columns.len(),
        "Configuration summary"
    );

    let provider = PageSinkProvider::from_config(&config.kafka);
    let mut sink = provider
        .create_sink(&config.topic)
        .context("failed to create page sink")?;

    if let Err(e) = publish_file(&mut sink, &args.input, args.batch_size).await {
        error!("Publishing stopped: {:#}", e);
        sink.abort();
        return Err(e);
    }

    let records = sink.records_sent();
    tokio::task::spawn_blocking(move || sink.finish())
        .await
        .context("finish task panicked")?
        .context("failed to deliver all records")?;

    info!(records, "All records delivered");
    Ok(())
}

async fn publish_file(
    sink: &mut KafkaPageSink,
    path: &Path,
    batch_size: usize,
) -> anyhow::Result<()> {
    let file = File::open(path)
        .await
        .with_context(|| format!("failed to open input {:?}", path))?;
    let mut lines = BufReader::new(file).lines();
    let mut builder = PageBuilder::new(sink.columns(), batch_size);
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        builder
            .push_line(&line)
            .with_context(|| format!("invalid row on line {}", line_number))?;

        if builder.is_full() {
            sink.append_page(&builder.build()?)?.await;
        }
    }

    if !builder.is_empty() {
        sink.append_page(&builder.build()?)?.await;
    }
    Ok(())
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("kafka_page_sink=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kafka_page_sink=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

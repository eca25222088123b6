use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use rdkafka::error::{KafkaError, RDKafkaErrorCode};

use crate::encoder::RowEncoder;
use crate::kafka::{DeliveryCallback, EncodedRecord, ProducerFactory, PublishOutcome, RecordProducer};
use crate::page::{Block, Value};
use crate::Result;

const COMPLETION_THREADS: usize = 4;

#[derive(Default)]
struct ProducerState {
    sent: Vec<(String, EncodedRecord)>,
    pending: Vec<(usize, Arc<dyn DeliveryCallback>)>,
    flushes: usize,
    closes: usize,
}

type FailurePredicate = Arc<dyn Fn(usize) -> bool + Send + Sync>;

/// Producer factory whose producers hold delivery reports until flushed,
/// then complete them from several threads at once.
#[derive(Clone)]
pub(crate) struct MockProducerFactory {
    state: Arc<Mutex<ProducerState>>,
    fails: FailurePredicate,
    available: bool,
    flush_fails: bool,
}

impl MockProducerFactory {
    pub(crate) fn new() -> Self {
        Self::failing(|_| false)
    }

    /// Records whose submission index matches `fails` are reported as failed.
    pub(crate) fn failing(fails: impl Fn(usize) -> bool + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProducerState::default())),
            fails: Arc::new(fails),
            available: true,
            flush_fails: false,
        }
    }

    pub(crate) fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Producers whose flush times out without completing anything.
    pub(crate) fn flush_failing() -> Self {
        Self {
            flush_fails: true,
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProducerState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn sent(&self) -> Vec<(String, EncodedRecord)> {
        self.lock().sent.clone()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.lock().pending.len()
    }

    pub(crate) fn flushes(&self) -> usize {
        self.lock().flushes
    }

    pub(crate) fn closes(&self) -> usize {
        self.lock().closes
    }
}

impl ProducerFactory for MockProducerFactory {
    fn create(&self) -> Result<Box<dyn RecordProducer>> {
        if !self.available {
            return Err(KafkaError::ClientCreation("broker unavailable".to_string()).into());
        }
        Ok(Box::new(MockProducer {
            state: Arc::clone(&self.state),
            fails: Arc::clone(&self.fails),
            flush_fails: self.flush_fails,
        }))
    }
}

struct MockProducer {
    state: Arc<Mutex<ProducerState>>,
    fails: FailurePredicate,
    flush_fails: bool,
}

impl RecordProducer for MockProducer {
    fn send(&self, topic: &str, record: EncodedRecord, callback: Arc<dyn DeliveryCallback>) {
        let mut state = self.state.lock().unwrap();
        let index = state.sent.len();
        state.sent.push((topic.to_string(), record));
        state.pending.push((index, callback));
    }

    fn in_flight_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    fn flush(&self) -> Result<()> {
        let pending = {
            let mut state = self.state.lock().unwrap();
            state.flushes += 1;
            if self.flush_fails {
                return Err(KafkaError::Flush(RDKafkaErrorCode::MessageTimedOut).into());
            }
            std::mem::take(&mut state.pending)
        };

        let chunk_size = pending.len().div_ceil(COMPLETION_THREADS).max(1);
        let handles: Vec<_> = pending
            .chunks(chunk_size)
            .map(|chunk| {
                let chunk = chunk.to_vec();
                let fails = Arc::clone(&self.fails);
                thread::spawn(move || {
                    for (index, callback) in chunk {
                        let outcome = if fails(index) {
                            PublishOutcome::Failed(format!("record {} rejected", index))
                        } else {
                            PublishOutcome::Delivered
                        };
                        callback.on_completion(outcome);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        Ok(())
    }

    fn close(self: Box<Self>) {
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        state.pending.clear();
    }
}

/// Encoder that remembers every row it was given.
///
/// Payloads are the row's values joined with `|`.
#[derive(Clone, Default)]
pub(crate) struct RecordingEncoder {
    rows: Arc<Mutex<Vec<Vec<Value>>>>,
    current: Vec<Value>,
}

impl RecordingEncoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn rows(&self) -> Vec<Vec<Value>> {
        self.rows.lock().unwrap().clone()
    }
}

impl RowEncoder for RecordingEncoder {
    fn append_column_value(&mut self, block: &Block, position: usize) -> Result<()> {
        self.current.push(block.value(position)?.clone());
        Ok(())
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let row = std::mem::take(&mut self.current);
        let payload = row
            .iter()
            .map(|v| match v {
                Value::Varchar(s) => s.clone(),
                other => format!("{:?}", other),
            })
            .collect::<Vec<_>>()
            .join("|");
        self.rows.lock().unwrap().push(row);
        Ok(payload.into_bytes())
    }

    fn clear(&mut self) {
        self.current.clear();
    }
}

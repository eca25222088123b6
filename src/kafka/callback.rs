use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Result of delivering one record, reported once per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// Delivery failed; the reason is only used for logging.
    Failed(String),
}

impl PublishOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PublishOutcome::Failed(_))
    }
}

/// Receives delivery reports, possibly from the producer's own threads.
pub trait DeliveryCallback: Send + Sync {
    fn on_completion(&self, outcome: PublishOutcome);
}

/// Counts failed deliveries across all records of one sink.
#[derive(Debug, Default)]
pub struct ErrorCountingCallback {
    failures: AtomicU64,
}

impl ErrorCountingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }
}

impl DeliveryCallback for ErrorCountingCallback {
    fn on_completion(&self, outcome: PublishOutcome) {
        if let PublishOutcome::Failed(reason) = outcome {
            let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
            debug!(failures, %reason, "Kafka record delivery failed");
        }
    }
}

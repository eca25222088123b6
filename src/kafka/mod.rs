pub mod callback;
pub mod producer;


pub use callback::{DeliveryCallback, ErrorCountingCallback, PublishOutcome};
pub use producer::{
    EncodedRecord, KafkaProducer, KafkaProducerFactory, ProducerFactory, RecordProducer,
    SinkProducerContext,
};

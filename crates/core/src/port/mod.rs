// Port Layer - Interfaces for external collaborators

pub mod id_provider; // For deterministic testing
pub mod producer;
pub mod sink;
pub mod subscriber;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use producer::{ExtractionParams, OpenedProducer, ProducerError, ProducerSource, RecordStream};
pub use sink::{RecordSink, SinkError};
pub use subscriber::{DeliveryError, MpscSubscriber, SubscriberChannel};
pub use time_provider::TimeProvider;

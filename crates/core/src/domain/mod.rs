// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod progress;
pub mod record;
pub mod snapshot;

// Re-exports
pub use error::DomainError;
pub use job::{Job, JobId, JobKind, JobStatus, Parameters};
pub use record::Record;
pub use snapshot::Snapshot;

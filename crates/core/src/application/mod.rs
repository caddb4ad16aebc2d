// Application Layer - Use Cases and Job Orchestration

pub mod blocking;
pub mod extraction;
pub mod janitor;
pub mod job_store;
pub mod orchestrator;
pub mod panic_guard;
pub mod shutdown;
pub mod subscribers;
pub mod supervisor;

// Re-exports
pub use blocking::blocking_stream;
pub use extraction::{ExtractionService, StartExtraction};
pub use janitor::{JanitorConfig, JanitorTask};
pub use job_store::JobStore;
pub use orchestrator::{BroadcastPolicy, ExtractionOrchestrator};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use subscribers::{BroadcastReport, ConnectionId, SubscriberRegistry};
pub use supervisor::{JobSupervisor, ShutdownReport};

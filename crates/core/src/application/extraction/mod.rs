// Extraction Service - entry point for starting runs

pub mod start;

pub use start::StartExtraction;

use crate::application::job_store::JobStore;
use crate::application::orchestrator::{BroadcastPolicy, ExtractionOrchestrator};
use crate::application::subscribers::SubscriberRegistry;
use crate::application::supervisor::JobSupervisor;
use crate::domain::JobId;
use crate::error::{AppError, Result};
use crate::port::{ProducerSource, RecordSink};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Creates jobs and hands them to the supervisor
pub struct ExtractionService {
    store: Arc<JobStore>,
    registry: Arc<SubscriberRegistry>,
    supervisor: Arc<JobSupervisor>,
    sink: Arc<dyn RecordSink>,
    sources: BTreeMap<String, Arc<dyn ProducerSource>>,
    policy: BroadcastPolicy,
}

impl ExtractionService {
    pub fn new(
        store: Arc<JobStore>,
        registry: Arc<SubscriberRegistry>,
        supervisor: Arc<JobSupervisor>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            store,
            registry,
            supervisor,
            sink,
            sources: BTreeMap::new(),
            policy: BroadcastPolicy::default(),
        }
    }

    /// Register the producer used for `kind`
    pub fn with_source(mut self, kind: impl Into<String>, source: Arc<dyn ProducerSource>) -> Self {
        self.sources.insert(kind.into(), source);
        self
    }

    pub fn with_policy(mut self, policy: BroadcastPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Create a Pending job and start its run in the background
    ///
    /// Returns as soon as the job exists; the run proceeds on the
    /// supervisor's tasks. Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// - AppError::Validation for an empty or unknown kind, or a zero limit
    pub fn start(&self, req: StartExtraction) -> Result<JobId> {
        start::validate_request(&req)?;

        let kind = req.job_kind();
        let source = self.sources.get(kind.as_str()).cloned().ok_or_else(|| {
            AppError::Validation(format!(
                "Unknown extraction kind '{}' (available: {})",
                kind,
                self.kinds().join(", ")
            ))
        })?;

        let job_id = self.store.create(kind.clone(), req.job_parameters());

        let orchestrator = ExtractionOrchestrator::new(
            job_id.clone(),
            kind,
            req.extraction_params(),
            source,
            Arc::clone(&self.sink),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
        )
        .with_policy(self.policy);
        self.supervisor.spawn(orchestrator);

        Ok(job_id)
    }
}

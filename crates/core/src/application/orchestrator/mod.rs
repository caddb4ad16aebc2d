// Extraction Orchestrator - drives one producer run for one job
// Sole writer of its job's state between Running and the terminal status.

pub mod constants;
mod throttle;

pub use throttle::BroadcastPolicy;

use self::constants::{AUTH_ERROR_PREFIX, CANCELLED_MESSAGE, EXTRACTION_ERROR_PREFIX};
use self::throttle::BroadcastThrottle;
use crate::application::job_store::JobStore;
use crate::application::shutdown::ShutdownToken;
use crate::application::subscribers::SubscriberRegistry;
use crate::domain::progress::calculate_progress;
use crate::domain::{JobId, JobKind, JobStatus};
use crate::error::AppError;
use crate::port::{ExtractionParams, ProducerError, ProducerSource, RecordSink};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a run ended, before it is written to the store
#[derive(Debug)]
enum RunOutcome {
    Exhausted { items: u64 },
    Failed { message: String },
    Cancelled { items: u64 },
    /// The store refused an update (job evicted or already terminal)
    Lost(AppError),
}

impl RunOutcome {
    fn producer_failed(error: &ProducerError) -> Self {
        let message = if error.is_credentials() {
            format!("{}: {}", AUTH_ERROR_PREFIX, error)
        } else {
            format!("{}: {}", EXTRACTION_ERROR_PREFIX, error)
        };
        RunOutcome::Failed { message }
    }
}

/// One extraction run
pub struct ExtractionOrchestrator {
    job_id: JobId,
    kind: JobKind,
    params: ExtractionParams,
    source: Arc<dyn ProducerSource>,
    sink: Arc<dyn RecordSink>,
    store: Arc<JobStore>,
    registry: Arc<SubscriberRegistry>,
    policy: BroadcastPolicy,
}

impl ExtractionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: JobId,
        kind: JobKind,
        params: ExtractionParams,
        source: Arc<dyn ProducerSource>,
        sink: Arc<dyn RecordSink>,
        store: Arc<JobStore>,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        Self {
            job_id,
            kind,
            params,
            source,
            sink,
            store,
            registry,
            policy: BroadcastPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BroadcastPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub(crate) fn store(&self) -> Arc<JobStore> {
        Arc::clone(&self.store)
    }

    pub(crate) fn registry(&self) -> Arc<SubscriberRegistry> {
        Arc::clone(&self.registry)
    }

    /// Run to completion; the job always ends Completed or Failed
    ///
    /// Never returns an error: every failure is recorded on the job.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(job_id = %self.job_id, kind = %self.kind, limit = ?self.params.limit, "Extraction started");

        let outcome = self.drive(&mut shutdown).await;
        self.finish(outcome).await;
    }

    async fn drive(&self, shutdown: &mut ShutdownToken) -> RunOutcome {
        if let Err(e) = self
            .store
            .update_progress(&self.job_id, JobStatus::Running, 0, 0, vec![])
        {
            return RunOutcome::Lost(e);
        }
        self.publish().await;

        let opened = tokio::select! {
            biased;
            _ = shutdown.wait() => return RunOutcome::Cancelled { items: 0 },
            opened = self.source.open(&self.params) => opened,
        };
        let opened = match opened {
            Ok(opened) => opened,
            Err(e) => {
                error!(job_id = %self.job_id, error = ?e, "Producer failed to open");
                return RunOutcome::producer_failed(&e);
            }
        };

        let total = opened.expected_total.or(self.params.limit);
        let mut records = opened.records;
        let mut throttle = BroadcastThrottle::new(self.policy);
        let mut items = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.wait() => return RunOutcome::Cancelled { items },
                next = records.next() => next,
            };

            let record = match next {
                None => break,
                Some(Ok(record)) => record,
                Some(Err(ProducerError::Malformed(detail))) => {
                    // One unparsable record is skipped like a sink rejection
                    error!(job_id = %self.job_id, items, detail = %detail, "Malformed record, skipping");
                    continue;
                }
                Some(Err(e)) => {
                    error!(job_id = %self.job_id, items, error = ?e, "Producer failed mid-run");
                    return RunOutcome::producer_failed(&e);
                }
            };

            if let Err(e) = self.sink.insert(&self.kind, &record).await {
                // Skipped records are not counted and do not fail the job
                error!(job_id = %self.job_id, key = ?record.key(), error = %e, "Record not persisted, skipping");
                continue;
            }
            items += 1;

            let progress = calculate_progress(items, total);
            if let Err(e) = self.store.update_progress(
                &self.job_id,
                JobStatus::Running,
                i64::from(progress),
                items,
                vec![],
            ) {
                return RunOutcome::Lost(e);
            }

            if throttle.record_persisted() {
                self.publish().await;
            }
        }

        RunOutcome::Exhausted { items }
    }

    async fn finish(&self, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Exhausted { items } => match self.store.complete(&self.job_id, items) {
                Ok(()) => {
                    info!(job_id = %self.job_id, items, "Extraction finished");
                    self.publish().await;
                }
                Err(e) => {
                    error!(job_id = %self.job_id, error = %e, "Could not mark job completed");
                }
            },
            RunOutcome::Failed { message } => {
                fail_and_publish(&self.store, &self.registry, &self.job_id, &message).await;
            }
            RunOutcome::Cancelled { items } => {
                info!(job_id = %self.job_id, items, "Extraction cancelled by shutdown");
                fail_and_publish(&self.store, &self.registry, &self.job_id, CANCELLED_MESSAGE)
                    .await;
            }
            RunOutcome::Lost(e) => {
                warn!(job_id = %self.job_id, error = %e, "Job no longer accepts updates, abandoning run");
            }
        }
    }

    /// Push the job's current snapshot to its subscribers
    async fn publish(&self) {
        publish(&self.store, &self.registry, &self.job_id).await;
    }
}

async fn publish(store: &JobStore, registry: &SubscriberRegistry, job_id: &str) {
    // Read first: the store lock is released before any delivery starts
    let Some(snapshot) = store.get(job_id).map(|job| job.snapshot()) else {
        return;
    };
    registry.broadcast(job_id, snapshot).await;
}

/// Mark a job Failed with `message` and broadcast the final snapshot.
///
/// A job that is already terminal or gone is left as it is.
pub(crate) async fn fail_and_publish(
    store: &JobStore,
    registry: &SubscriberRegistry,
    job_id: &str,
    message: &str,
) {
    match store.fail(job_id, message) {
        Ok(()) => publish(store, registry, job_id).await,
        Err(e) => debug!(job_id = %job_id, error = %e, "Job not failed, state is already final"),
    }
}

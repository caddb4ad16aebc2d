// Job Supervisor - owns every spawned extraction run
// Panicked or aborted runs still leave their job Failed.

use crate::application::orchestrator::constants::{CANCELLED_MESSAGE, EXTRACTION_ERROR_PREFIX};
use crate::application::orchestrator::{fail_and_publish, ExtractionOrchestrator};
use crate::application::panic_guard::panic_message;
use crate::application::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::domain::JobId;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Time a watcher gets to record an aborted run
const ABORT_SETTLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Cap for a grace period too large to add to the clock
const MAX_GRACE: Duration = Duration::from_secs(24 * 3600);

struct RunHandle {
    job_id: JobId,
    abort: AbortHandle,
    watcher: JoinHandle<()>,
}

/// Outcome of [`JobSupervisor::shutdown`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Runs that stopped on their own within the grace period
    pub finished: usize,
    /// Runs that had to be aborted
    pub aborted: usize,
}

/// Spawns orchestrators and stops them on shutdown
pub struct JobSupervisor {
    shutdown_tx: ShutdownSender,
    runs: Mutex<Vec<RunHandle>>,
}

impl Default for JobSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl JobSupervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = shutdown_channel();
        Self {
            shutdown_tx,
            runs: Mutex::new(Vec::new()),
        }
    }

    fn lock_runs(&self) -> MutexGuard<'_, Vec<RunHandle>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Token observing this supervisor's shutdown
    pub fn token(&self) -> ShutdownToken {
        self.shutdown_tx.token()
    }

    /// Spawn a run on the tokio runtime
    ///
    /// The run gets its own task; a watcher task marks the job Failed if
    /// the run panics or is aborted.
    pub fn spawn(&self, orchestrator: ExtractionOrchestrator) {
        let job_id = orchestrator.job_id().to_string();
        let store = orchestrator.store();
        let registry = orchestrator.registry();

        let run = tokio::spawn(orchestrator.run(self.token()));
        let abort = run.abort_handle();

        let watched_id = job_id.clone();
        let watcher = tokio::spawn(async move {
            let message = match run.await {
                Ok(()) => return,
                Err(e) if e.is_panic() => {
                    let panic_msg = panic_message(e.into_panic().as_ref());
                    error!(job_id = %watched_id, panic_msg = %panic_msg, "Extraction task panicked");
                    format!("{}: internal panic: {}", EXTRACTION_ERROR_PREFIX, panic_msg)
                }
                Err(_) => CANCELLED_MESSAGE.to_string(),
            };
            fail_and_publish(&store, &registry, &watched_id, &message).await;
        });

        let mut runs = self.lock_runs();
        runs.retain(|r| !r.watcher.is_finished());
        runs.push(RunHandle {
            job_id,
            abort,
            watcher,
        });
    }

    /// Number of runs that have not finished yet
    pub fn active_count(&self) -> usize {
        self.lock_runs()
            .iter()
            .filter(|r| !r.watcher.is_finished())
            .count()
    }

    /// Signal every run to stop, wait up to `grace`, then abort the rest
    ///
    /// Aborted runs end with their job Failed and a final broadcast.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.shutdown_tx.shutdown();

        let runs = std::mem::take(&mut *self.lock_runs());
        let grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        info!(runs = runs.len(), grace_ms, "Stopping extraction runs");

        let now = Instant::now();
        let deadline = now.checked_add(grace).unwrap_or(now + MAX_GRACE);
        let mut report = ShutdownReport::default();

        for mut run in runs {
            if tokio::time::timeout_at(deadline, &mut run.watcher).await.is_ok() {
                report.finished += 1;
                continue;
            }

            warn!(job_id = %run.job_id, "Extraction did not stop within grace period, aborting");
            run.abort.abort();
            if tokio::time::timeout(ABORT_SETTLE_TIMEOUT, run.watcher).await.is_err() {
                error!(job_id = %run.job_id, "Aborted run was not recorded in time");
            }
            report.aborted += 1;
        }

        info!(
            finished = report.finished,
            aborted = report.aborted,
            "Extraction runs stopped"
        );
        report
    }
}

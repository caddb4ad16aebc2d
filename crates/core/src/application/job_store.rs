// Job Store - in-memory registry of extraction jobs
// One mutex per store; every operation is a single critical section.

use crate::domain::{DomainError, Job, JobId, JobKind, JobStatus, Parameters, Snapshot};
use crate::error::{AppError, Result};
use crate::port::id_provider::UuidProvider;
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{IdProvider, TimeProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Canonical state of every in-flight or recently finished job.
///
/// Jobs live in memory for the life of the process and leave only through
/// [`JobStore::sweep`] / [`JobStore::sweep_retaining`].
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl JobStore {
    pub fn new(id_provider: Arc<dyn IdProvider>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            id_provider,
            time_provider,
        }
    }

    /// UUID ids and the system clock
    pub fn with_system_providers() -> Self {
        Self::new(Arc::new(UuidProvider), Arc::new(SystemTimeProvider))
    }

    // No operation can leave a job half-written, so a poisoned map is still usable
    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_found(id: &str) -> AppError {
        AppError::Domain(DomainError::JobNotFound(id.to_string()))
    }

    /// Run `f` against one job inside the critical section
    fn with_job<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Job, i64) -> crate::domain::error::Result<T>,
    ) -> Result<T> {
        let now = self.time_provider.now_millis();
        let mut jobs = self.lock();
        let job = jobs.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        Ok(f(job, now)?)
    }

    /// Create a new Pending job and return its id
    pub fn create(&self, kind: JobKind, parameters: Parameters) -> JobId {
        let started_at = self.time_provider.now_millis();
        let id = {
            let mut jobs = self.lock();
            let mut id = self.id_provider.generate_id();
            while jobs.contains_key(&id) {
                id = self.id_provider.generate_id();
            }
            jobs.insert(
                id.clone(),
                Job::new(id.clone(), kind.clone(), parameters, started_at),
            );
            id
        };

        info!(job_id = %id, kind = %kind, "Created extraction job");
        id
    }

    /// Copy of the job, or None for an unknown id
    pub fn get(&self, id: &str) -> Option<Job> {
        self.lock().get(id).cloned()
    }

    /// Wire view of the job, stamped with the observation time
    pub fn snapshot(&self, id: &str) -> Option<Snapshot> {
        let snapshot = self.lock().get(id).map(Job::snapshot)?;
        Some(snapshot.with_timestamp(self.time_provider.now()))
    }

    /// Set status, clamped progress and item count; append `new_errors`
    ///
    /// # Errors
    /// - DomainError::JobNotFound for an unknown id
    /// - DomainError::InvalidStateTransition if the job is terminal or the
    ///   status would move backwards
    pub fn update_progress(
        &self,
        id: &str,
        status: JobStatus,
        progress: i64,
        items_processed: u64,
        new_errors: Vec<String>,
    ) -> Result<()> {
        self.with_job(id, |job, now| {
            job.record_progress(status, progress, items_processed, new_errors, now)
        })?;

        debug!(
            job_id = %id,
            status = %status,
            progress = progress,
            items_processed = items_processed,
            "Updated job progress"
        );
        Ok(())
    }

    /// Mark the job Completed with progress forced to 100
    pub fn complete(&self, id: &str, items_processed: u64) -> Result<()> {
        self.with_job(id, |job, now| job.complete(items_processed, now))?;

        info!(job_id = %id, items_processed, "Job completed");
        Ok(())
    }

    /// Mark the job Failed and append `error` to its error list
    pub fn fail(&self, id: &str, error: impl Into<String>) -> Result<()> {
        let error = error.into();
        self.with_job(id, |job, now| job.fail(error.clone(), now))?;

        warn!(job_id = %id, error = %error, "Job failed");
        Ok(())
    }

    /// Copies of all jobs, oldest first
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.lock().values().cloned().collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Remove every job created more than `max_age` ago, whatever its status
    ///
    /// # Returns
    /// Number of jobs removed
    pub fn sweep(&self, max_age: Duration) -> usize {
        self.sweep_retaining(max_age, |_| false)
    }

    /// Like [`JobStore::sweep`], but aged jobs for which `keep` returns true survive
    pub fn sweep_retaining(&self, max_age: Duration, keep: impl Fn(&Job) -> bool) -> usize {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.time_provider.now_millis().saturating_sub(max_age_ms);

        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, job| job.started_at >= cutoff || keep(job));
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use std::collections::HashSet;
    use tokio_test::{assert_err, assert_ok};

    const HOUR: Duration = Duration::from_secs(3600);
    const T0: i64 = 1_700_000_000_000;

    fn store_with_clock() -> (JobStore, Arc<ManualTimeProvider>) {
        let clock = Arc::new(ManualTimeProvider::new(T0));
        let store = JobStore::new(Arc::new(SequentialIdProvider::default()), clock.clone());
        (store, clock)
    }

    fn telegram() -> JobKind {
        JobKind::new("telegram")
    }

    #[test]
    fn test_create_starts_pending() {
        let (store, _) = store_with_clock();
        let mut params = Parameters::new();
        params.insert("limit".to_string(), serde_json::json!(100));

        let id = store.create(telegram(), params.clone());
        let job = store.get(&id).unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.items_processed, 0);
        assert!(job.errors.is_empty());
        assert_eq!(job.started_at, T0);
        assert_eq!(job.kind, telegram());
        assert_eq!(job.parameters, params);
    }

    #[test]
    fn test_update_progress_clamps() {
        let (store, _) = store_with_clock();
        let id = store.create(telegram(), Parameters::new());

        assert_ok!(store.update_progress(&id, JobStatus::Running, 150, 3, vec![]));
        assert_eq!(store.get(&id).unwrap().progress, 100);

        let other = store.create(telegram(), Parameters::new());
        assert_ok!(store.update_progress(&other, JobStatus::Running, -10, 0, vec![]));
        assert_eq!(store.get(&other).unwrap().progress, 0);
    }

    #[test]
    fn test_complete_forces_full_progress() {
        let (store, clock) = store_with_clock();
        let id = store.create(telegram(), Parameters::new());
        store
            .update_progress(&id, JobStatus::Running, 37, 12, vec![])
            .unwrap();

        clock.advance(Duration::from_secs(5));
        store.complete(&id, 12).unwrap();

        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.items_processed, 12);
        assert_eq!(job.finished_at, Some(T0 + 5_000));
    }

    #[test]
    fn test_complete_requires_running() {
        let (store, _) = store_with_clock();
        let id = store.create(telegram(), Parameters::new());

        let err = store.complete(&id, 0).unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::InvalidStateTransition { .. })
        ));

        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn test_errors_accumulate_in_order() {
        let (store, _) = store_with_clock();
        let id = store.create(telegram(), Parameters::new());

        store
            .update_progress(&id, JobStatus::Running, 10, 1, vec!["E1".to_string()])
            .unwrap();
        store.fail(&id, "E2").unwrap();

        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.errors, vec!["E1".to_string(), "E2".to_string()]);
        assert_eq!(job.progress, 10);
        assert_eq!(job.items_processed, 1);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_terminal_job_rejects_updates() {
        let (store, _) = store_with_clock();
        let id = store.create(telegram(), Parameters::new());
        store.fail(&id, "Authentication error: bad session").unwrap();

        let err = store.complete(&id, 3).unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::InvalidStateTransition { .. })
        ));
        assert_err!(store.update_progress(&id, JobStatus::Running, 50, 3, vec![]));

        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.errors.len(), 1);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (store, _) = store_with_clock();

        assert!(store.get("missing").is_none());
        assert!(store.snapshot("missing").is_none());

        let err = store
            .update_progress("missing", JobStatus::Running, 1, 1, vec![])
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.complete("missing", 1).unwrap_err().is_not_found());
        assert!(store.fail("missing", "x").unwrap_err().is_not_found());
    }

    #[test]
    fn test_snapshot_is_stamped() {
        let (store, clock) = store_with_clock();
        let id = store.create(telegram(), Parameters::new());
        clock.advance(Duration::from_secs(1));

        let snapshot = store.snapshot(&id).unwrap();
        assert_eq!(snapshot.job_id, id);
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(
            snapshot.timestamp.map(|t| t.timestamp_millis()),
            Some(T0 + 1_000)
        );
    }

    #[test]
    fn test_sweep_removes_only_old_jobs() {
        let (store, clock) = store_with_clock();

        let old = store.create(telegram(), Parameters::new());
        clock.advance(24 * HOUR);
        let recent = store.create(telegram(), Parameters::new());
        clock.advance(HOUR);

        // old is now 25h old, recent 1h old
        assert_eq!(store.sweep(24 * HOUR), 1);
        assert!(store.get(&old).is_none());
        assert!(store.get(&recent).is_some());
        assert_eq!(store.sweep(24 * HOUR), 0);
    }

    #[test]
    fn test_sweep_ignores_status() {
        let (store, clock) = store_with_clock();
        let running = store.create(telegram(), Parameters::new());
        store
            .update_progress(&running, JobStatus::Running, 0, 0, vec![])
            .unwrap();
        clock.advance(25 * HOUR);

        assert_eq!(store.sweep(24 * HOUR), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_retaining_keeps_selected_jobs() {
        let (store, clock) = store_with_clock();
        let done = store.create(telegram(), Parameters::new());
        store
            .update_progress(&done, JobStatus::Running, 0, 0, vec![])
            .unwrap();
        store.complete(&done, 1).unwrap();
        let running = store.create(telegram(), Parameters::new());
        store
            .update_progress(&running, JobStatus::Running, 0, 0, vec![])
            .unwrap();
        clock.advance(25 * HOUR);

        let removed = store.sweep_retaining(24 * HOUR, |job| !job.status.is_terminal());

        assert_eq!(removed, 1);
        assert!(store.get(&done).is_none());
        assert!(store.get(&running).is_some());
    }

    #[test]
    fn test_list_returns_copies_oldest_first() {
        let (store, clock) = store_with_clock();
        let first = store.create(telegram(), Parameters::new());
        clock.advance(Duration::from_secs(1));
        let second = store.create(JobKind::new("instagram"), Parameters::new());

        let mut jobs = store.list();
        assert_eq!(
            jobs.iter().map(|j| j.id.clone()).collect::<Vec<_>>(),
            vec![first.clone(), second]
        );

        // Mutating the copy leaves the store untouched
        jobs[0].progress = 99;
        assert_eq!(store.get(&first).unwrap().progress, 0);
    }

    #[tokio::test]
    async fn test_concurrent_create_yields_distinct_ids() {
        let store = Arc::new(JobStore::with_system_providers());

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.create(JobKind::new("telegram"), Parameters::new())
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }

        assert_eq!(ids.len(), 50);
        for id in &ids {
            assert!(store.get(id).is_some());
        }
        assert_eq!(store.len(), 50);
    }
}

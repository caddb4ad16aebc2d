// Janitor - periodic eviction of old jobs from the store

use crate::application::job_store::JobStore;
use crate::application::shutdown::ShutdownToken;
use crate::application::subscribers::SubscriberRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Default time between sweeps (60 minutes)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default maximum job age (24 hours)
pub const DEFAULT_MAX_JOB_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JanitorConfig {
    pub interval: Duration,
    pub max_age: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            max_age: DEFAULT_MAX_JOB_AGE,
        }
    }
}

/// Background task that sweeps the job store
///
/// Without a registry the sweep is purely age based. With one, aged jobs
/// that are still running or still watched by a subscriber are kept until
/// a later sweep.
pub struct JanitorTask {
    store: Arc<JobStore>,
    registry: Option<Arc<SubscriberRegistry>>,
    config: JanitorConfig,
}

impl JanitorTask {
    pub fn new(store: Arc<JobStore>, config: JanitorConfig) -> Self {
        Self {
            store,
            registry: None,
            config,
        }
    }

    pub fn with_registry(mut self, registry: Arc<SubscriberRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sweep every interval until shutdown (background task)
    ///
    /// The first sweep happens one interval after start.
    /// Should be spawned in tokio::spawn
    pub async fn run(self, mut shutdown: ShutdownToken) {
        let period = self.config.interval.max(MIN_SWEEP_INTERVAL);
        info!(
            interval_secs = period.as_secs(),
            max_age_hours = self.config.max_age.as_secs() / 3600,
            "Janitor started"
        );

        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!("Janitor stopped");
                    break;
                }
                _ = tick.tick() => {
                    self.run_now().await;
                }
            }
        }
    }

    /// Run one sweep immediately
    ///
    /// # Returns
    /// Number of jobs evicted
    pub async fn run_now(&self) -> usize {
        let removed = match &self.registry {
            None => self.store.sweep(self.config.max_age),
            Some(registry) => {
                // Collected before the store lock is taken
                let watched: HashSet<String> = registry.watched_jobs().await;
                self.store.sweep_retaining(self.config.max_age, |job| {
                    !job.status.is_terminal() || watched.contains(&job.id)
                })
            }
        };

        if removed > 0 {
            info!(
                removed,
                remaining = self.store.len(),
                "Janitor evicted old jobs"
            );
        } else {
            debug!("Janitor found nothing to evict");
        }
        removed
    }
}

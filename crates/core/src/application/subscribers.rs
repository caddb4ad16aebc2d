// Subscriber Registry - fan-out of job snapshots to live channels
// The connection map is guarded by an async mutex; deliveries run outside it.

use crate::domain::{JobId, Snapshot};
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{SubscriberChannel, TimeProvider};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Handle returned by [`SubscriberRegistry::attach`]
pub type ConnectionId = u64;

type Attached = Vec<(ConnectionId, Arc<dyn SubscriberChannel>)>;

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Tracks which channels watch which job.
///
/// A job may have any number of channels; a channel belongs to exactly one
/// job. Jobs with no channels have no entry.
pub struct SubscriberRegistry {
    connections: Mutex<HashMap<JobId, Attached>>,
    next_id: AtomicU64,
    time_provider: Arc<dyn TimeProvider>,
}

impl SubscriberRegistry {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            time_provider,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemTimeProvider))
    }

    /// Register a channel for a job
    pub async fn attach(&self, job_id: &str, channel: Arc<dyn SubscriberChannel>) -> ConnectionId {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let total = {
            let mut conns = self.connections.lock().await;
            let attached = conns.entry(job_id.to_string()).or_default();
            attached.push((conn_id, channel));
            attached.len()
        };

        info!(job_id = %job_id, conn_id, total, "Subscriber attached");
        conn_id
    }

    /// Remove a channel and tear it down
    ///
    /// # Returns
    /// false if the channel was not attached (already detached, or never was)
    pub async fn detach(&self, job_id: &str, conn_id: ConnectionId) -> bool {
        let removed = {
            let mut conns = self.connections.lock().await;
            Self::remove_locked(&mut conns, job_id, &[conn_id])
        };

        let found = !removed.is_empty();
        for channel in removed {
            channel.close().await;
        }

        if found {
            info!(job_id = %job_id, conn_id, "Subscriber detached");
        }
        found
    }

    fn remove_locked(
        conns: &mut HashMap<JobId, Attached>,
        job_id: &str,
        conn_ids: &[ConnectionId],
    ) -> Vec<Arc<dyn SubscriberChannel>> {
        let Some(attached) = conns.get_mut(job_id) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        attached.retain(|(id, channel)| {
            if conn_ids.contains(id) {
                removed.push(Arc::clone(channel));
                false
            } else {
                true
            }
        });

        if attached.is_empty() {
            conns.remove(job_id);
        }
        removed
    }

    /// Send a snapshot, stamped with the current time, to every channel of a job
    ///
    /// Channels whose delivery fails are detached once every delivery has
    /// finished. A job nobody watches is a no-op.
    pub async fn broadcast(&self, job_id: &str, snapshot: Snapshot) -> BroadcastReport {
        let targets: Attached = {
            let conns = self.connections.lock().await;
            match conns.get(job_id) {
                Some(attached) => attached.clone(),
                None => return BroadcastReport::default(),
            }
        };

        let snapshot = snapshot.stamped(self.time_provider.now());
        let results = join_all(targets.iter().map(|(conn_id, channel)| {
            let snapshot = &snapshot;
            async move { (*conn_id, channel.deliver(snapshot).await) }
        }))
        .await;

        let mut dead = Vec::new();
        for (conn_id, result) in results {
            if let Err(e) = result {
                warn!(job_id = %job_id, conn_id, error = %e, "Snapshot delivery failed, dropping subscriber");
                dead.push(conn_id);
            }
        }

        let report = BroadcastReport {
            delivered: targets.len() - dead.len(),
            failed: dead.len(),
        };

        if !dead.is_empty() {
            let removed = {
                let mut conns = self.connections.lock().await;
                Self::remove_locked(&mut conns, job_id, &dead)
            };
            for channel in removed {
                channel.close().await;
            }
        }

        debug!(
            job_id = %job_id,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast snapshot"
        );
        report
    }

    /// Number of channels currently watching a job
    pub async fn connection_count(&self, job_id: &str) -> usize {
        self.connections
            .lock()
            .await
            .get(job_id)
            .map_or(0, Vec::len)
    }

    /// Ids of every job with at least one channel
    pub async fn watched_jobs(&self) -> HashSet<JobId> {
        self.connections.lock().await.keys().cloned().collect()
    }

    /// Detach and close every channel (used during shutdown)
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<dyn SubscriberChannel>> = {
            let mut conns = self.connections.lock().await;
            conns
                .drain()
                .flat_map(|(_, attached)| attached.into_iter().map(|(_, channel)| channel))
                .collect()
        };

        let count = drained.len();
        join_all(drained.iter().map(|channel| channel.close())).await;

        if count > 0 {
            info!(count, "Closed all subscriber channels");
        }
        count
    }
}

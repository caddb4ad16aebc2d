//! Subscription Channel
//!
//! Bridges a JSON-RPC subscription into the subscriber registry.

use async_trait::async_trait;
use harvest_core::domain::{JobStatus, Snapshot};
use harvest_core::port::{DeliveryError, SubscriberChannel};
use jsonrpsee::{SubscriptionMessage, SubscriptionSink};
use tokio::sync::{Mutex, Notify};

/// One `jobs.subscribe.v1` subscription
///
/// `finished` resolves once a terminal snapshot went out or the registry
/// closed the channel; the subscription then ends.
pub struct RpcSubscriberChannel {
    sink: SubscriptionSink,
    order: Mutex<DeliveryOrder>,
    done: Notify,
}

impl RpcSubscriberChannel {
    pub fn new(sink: SubscriptionSink) -> Self {
        Self {
            sink,
            order: Mutex::new(DeliveryOrder::default()),
            done: Notify::new(),
        }
    }

    pub async fn finished(&self) {
        self.done.notified().await;
    }
}

#[async_trait]
impl SubscriberChannel for RpcSubscriberChannel {
    async fn deliver(&self, snapshot: &Snapshot) -> Result<(), DeliveryError> {
        // Held across the send so two deliveries never overtake each other
        let mut order = self.order.lock().await;
        if !order.admit(snapshot) {
            return Ok(());
        }

        let msg = SubscriptionMessage::from_json(snapshot)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        self.sink
            .send(msg)
            .await
            .map_err(|_| DeliveryError::Closed)?;

        if snapshot.status.is_terminal() {
            self.done.notify_one();
        }
        Ok(())
    }

    async fn close(&self) {
        self.done.notify_one();
    }
}

/// Position of the newest snapshot sent so far
///
/// The initial snapshot races the orchestrator's broadcasts, so an older
/// view can show up after a newer one; it is dropped instead of sent.
#[derive(Debug, Default)]
struct DeliveryOrder {
    last: Option<(u8, u64)>,
}

impl DeliveryOrder {
    fn position(snapshot: &Snapshot) -> (u8, u64) {
        let stage = match snapshot.status {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        };
        (stage, snapshot.items_processed)
    }

    /// True if `snapshot` should be sent; records it as the newest
    fn admit(&mut self, snapshot: &Snapshot) -> bool {
        let position = Self::position(snapshot);
        match self.last {
            // Nothing follows a terminal snapshot
            Some((2, _)) => false,
            Some(last) if position < last => false,
            _ => {
                self.last = Some(position);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: JobStatus, items: u64) -> Snapshot {
        Snapshot {
            job_id: "job-1".to_string(),
            status,
            progress: 0,
            items_processed: items,
            errors: vec![],
            timestamp: None,
        }
    }

    #[test]
    fn test_stale_running_after_completed_is_dropped() {
        let mut order = DeliveryOrder::default();

        assert!(order.admit(&snapshot(JobStatus::Completed, 40)));
        assert!(!order.admit(&snapshot(JobStatus::Running, 12)));
        assert!(!order.admit(&snapshot(JobStatus::Completed, 40)));
    }

    #[test]
    fn test_older_progress_is_dropped() {
        let mut order = DeliveryOrder::default();

        assert!(order.admit(&snapshot(JobStatus::Running, 20)));
        assert!(!order.admit(&snapshot(JobStatus::Running, 10)));
        assert!(!order.admit(&snapshot(JobStatus::Pending, 0)));
        assert!(order.admit(&snapshot(JobStatus::Running, 20)));
        assert!(order.admit(&snapshot(JobStatus::Failed, 20)));
    }

    #[test]
    fn test_in_order_stream_passes_through() {
        let mut order = DeliveryOrder::default();
        let stream = [
            snapshot(JobStatus::Pending, 0),
            snapshot(JobStatus::Running, 0),
            snapshot(JobStatus::Running, 10),
            snapshot(JobStatus::Completed, 25),
        ];

        assert!(stream.iter().all(|s| order.admit(s)));
    }
}

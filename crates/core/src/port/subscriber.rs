// Subscriber Channel Port (Interface)
// One live real-time channel attached to a job id. The transport owns the
// underlying connection; the registry only keeps track of it.

use crate::domain::Snapshot;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("channel closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait SubscriberChannel: Send + Sync {
    /// Push one snapshot to the subscriber
    async fn deliver(&self, snapshot: &Snapshot) -> Result<(), DeliveryError>;

    /// Best-effort teardown after the channel was detached
    async fn close(&self) {}
}

/// In-process subscriber backed by a bounded tokio mpsc channel.
///
/// A full buffer makes `deliver` wait, which only delays this subscriber.
pub struct MpscSubscriber {
    tx: mpsc::Sender<Snapshot>,
}

impl MpscSubscriber {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Snapshot>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SubscriberChannel for MpscSubscriber {
    async fn deliver(&self, snapshot: &Snapshot) -> Result<(), DeliveryError> {
        self.tx
            .send(snapshot.clone())
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every snapshot it receives
    #[derive(Default)]
    pub struct RecordingChannel {
        received: Mutex<Vec<Snapshot>>,
        closed: AtomicBool,
        delay: Option<Duration>,
    }

    impl RecordingChannel {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every delivery takes `delay`
        pub fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn received(&self) -> Vec<Snapshot> {
            self.received.lock().unwrap().clone()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SubscriberChannel for RecordingChannel {
        async fn deliver(&self, snapshot: &Snapshot) -> Result<(), DeliveryError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.received.lock().unwrap().push(snapshot.clone());
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Fails every delivery
    #[derive(Default)]
    pub struct FailingChannel {
        attempts: AtomicUsize,
        closed: AtomicBool,
    }

    impl FailingChannel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SubscriberChannel for FailingChannel {
        async fn deliver(&self, _snapshot: &Snapshot) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Transport("connection reset".to_string()))
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}

// Record Sink Port (Interface)

use crate::domain::{JobKind, Record};
use async_trait::async_trait;
use thiserror::Error;

/// Per-record persistence errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("record rejected: {0}")]
    Rejected(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Persists one record at a time.
///
/// A failed insert must not affect other records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn insert(&self, kind: &JobKind, record: &Record) -> Result<(), SinkError>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory sink; can reject records by key and simulate slow storage
    #[derive(Default)]
    pub struct MemorySink {
        records: Mutex<Vec<(JobKind, Record)>>,
        reject_keys: HashSet<String>,
        delay: Option<Duration>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reject records whose key is in `keys`
        pub fn rejecting<I, S>(keys: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                reject_keys: keys.into_iter().map(Into::into).collect(),
                ..Self::default()
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn records(&self) -> Vec<Record> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .map(|(_, r)| r.clone())
                .collect()
        }

        pub fn len(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl RecordSink for MemorySink {
        async fn insert(&self, kind: &JobKind, record: &Record) -> Result<(), SinkError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(key) = record.key() {
                if self.reject_keys.contains(&key) {
                    return Err(SinkError::Rejected(format!("record {} refused", key)));
                }
            }
            self.records
                .lock()
                .unwrap()
                .push((kind.clone(), record.clone()));
            Ok(())
        }
    }
}

// Producer Port (Interface)
// A producer yields the records of one extraction run, lazily and once.

use crate::domain::{Parameters, Record};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Lazy, finite, non-restartable sequence of records
pub type RecordStream = BoxStream<'static, Result<Record, ProducerError>>;

/// Producer errors
///
/// `CredentialsRejected` is kept apart from everything else so a failed job
/// can say "authentication problem" instead of a generic extraction error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProducerError {
    #[error("credentials rejected: {0}")]
    CredentialsRejected(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("{0}")]
    Failed(String),
}

impl ProducerError {
    pub fn is_credentials(&self) -> bool {
        matches!(self, ProducerError::CredentialsRejected(_))
    }
}

/// Parameters handed to a producer when a run is opened
#[derive(Debug, Clone, Default)]
pub struct ExtractionParams {
    /// Maximum number of records to fetch (None = everything available)
    pub limit: Option<u64>,

    /// Re-process records the producer has already seen
    pub force_update: bool,

    /// Producer-specific options (credentials, filters); opaque to the core
    pub options: Parameters,
}

impl ExtractionParams {
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }
}

/// An opened producer: the record stream plus an optional size estimate
pub struct OpenedProducer {
    /// Expected number of records, when the producer can tell
    pub expected_total: Option<u64>,
    pub records: RecordStream,
}

impl OpenedProducer {
    pub fn new(records: RecordStream) -> Self {
        Self {
            expected_total: None,
            records,
        }
    }

    pub fn with_expected_total(mut self, expected_total: Option<u64>) -> Self {
        self.expected_total = expected_total;
        self
    }
}

impl std::fmt::Debug for OpenedProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedProducer")
            .field("expected_total", &self.expected_total)
            .finish_non_exhaustive()
    }
}

/// Producer source trait, one implementation per extraction kind
///
/// Implementations:
/// - CommandProducerSource: external scraper process, JSON lines on stdout
/// - JsonlFileSource: export file read on a blocking worker thread
#[async_trait]
pub trait ProducerSource: Send + Sync {
    /// Open a run (connect, authenticate, start the scraper)
    ///
    /// # Errors
    /// - ProducerError::CredentialsRejected if the credentials or session are refused
    /// - any other ProducerError if the source cannot be reached
    async fn open(&self, params: &ExtractionParams) -> Result<OpenedProducer, ProducerError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use futures::stream::{self, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock producer behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Yield N records then stop
        Records(u64),
        /// Refuse to open
        FailOpen(ProducerError),
        /// Yield N records then raise an error
        FailAfter(u64, ProducerError),
        /// Yield N records then never yield again
        Stall(u64),
        /// Yield N records where the one at position `at` (1-based) is unparsable
        MalformedAt { count: u64, at: u64 },
    }

    /// Mock Producer Source for testing
    pub struct MockProducerSource {
        behavior: MockBehavior,
        expected_total: Option<u64>,
        open_count: AtomicUsize,
    }

    impl MockProducerSource {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                expected_total: None,
                open_count: AtomicUsize::new(0),
            }
        }

        pub fn records(count: u64) -> Self {
            Self::new(MockBehavior::Records(count))
        }

        pub fn fail_open(error: ProducerError) -> Self {
            Self::new(MockBehavior::FailOpen(error))
        }

        pub fn fail_after(count: u64, error: ProducerError) -> Self {
            Self::new(MockBehavior::FailAfter(count, error))
        }

        pub fn stall_after(count: u64) -> Self {
            Self::new(MockBehavior::Stall(count))
        }

        pub fn malformed_at(count: u64, at: u64) -> Self {
            Self::new(MockBehavior::MalformedAt { count, at })
        }

        pub fn with_expected_total(mut self, total: u64) -> Self {
            self.expected_total = Some(total);
            self
        }

        pub fn open_count(&self) -> usize {
            self.open_count.load(Ordering::SeqCst)
        }

        fn records_stream(count: u64) -> impl futures::Stream<Item = Result<Record, ProducerError>> {
            stream::iter((1..=count).map(|i| Ok(Record::new(serde_json::json!({ "id": i })))))
        }
    }

    #[async_trait]
    impl ProducerSource for MockProducerSource {
        async fn open(&self, _params: &ExtractionParams) -> Result<OpenedProducer, ProducerError> {
            self.open_count.fetch_add(1, Ordering::SeqCst);

            let records: RecordStream = match &self.behavior {
                MockBehavior::Records(n) => Self::records_stream(*n).boxed(),
                MockBehavior::FailOpen(err) => return Err(err.clone()),
                MockBehavior::FailAfter(n, err) => Self::records_stream(*n)
                    .chain(stream::once(futures::future::ready(Err(err.clone()))))
                    .boxed(),
                MockBehavior::Stall(n) => Self::records_stream(*n).chain(stream::pending()).boxed(),
                MockBehavior::MalformedAt { count, at } => {
                    let at = *at;
                    Self::records_stream(*count)
                        .enumerate()
                        .map(move |(idx, item)| {
                            if idx as u64 + 1 == at {
                                Err(ProducerError::Malformed(format!("record {}", at)))
                            } else {
                                item
                            }
                        })
                        .boxed()
                }
            };

            Ok(OpenedProducer::new(records).with_expected_total(self.expected_total))
        }
    }
}

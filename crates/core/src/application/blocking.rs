// Blocking producer adapter
// Runs a synchronous record iterator on the blocking pool and hands records
// to the async side one at a time.

use crate::application::panic_guard::execute_guarded;
use crate::domain::Record;
use crate::port::{ProducerError, RecordStream};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

/// Turn a blocking iterator into a [`RecordStream`]
///
/// `open` is called on a blocking worker thread, so the iterator it builds
/// never has to cross threads. The bounded channel keeps the producer at
/// most one record ahead of the consumer. Dropping the stream stops the
/// producer at its next record; a panic surfaces as a producer error.
pub fn blocking_stream<F, I>(open: F) -> RecordStream
where
    F: FnOnce() -> I + Send + 'static,
    I: IntoIterator<Item = Result<Record, ProducerError>>,
{
    let (tx, rx) = mpsc::channel(1);

    tokio::task::spawn_blocking(move || {
        let produced = execute_guarded(|| {
            for item in open() {
                if tx.blocking_send(item).is_err() {
                    debug!("Record stream dropped, stopping blocking producer");
                    return;
                }
            }
        });

        if let Err(panic_msg) = produced {
            let _ = tx.blocking_send(Err(ProducerError::Failed(format!(
                "producer panicked: {}",
                panic_msg
            ))));
        }
    });

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed()
}

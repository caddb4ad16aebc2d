//! Engine shutdown: in-flight runs end Failed and subscribers hear about it

use std::sync::Arc;
use std::time::Duration;

use harvest_core::application::{
    shutdown_channel, ExtractionService, JanitorConfig, JanitorTask, JobStore, JobSupervisor,
    StartExtraction, SubscriberRegistry,
};
use harvest_core::domain::JobStatus;
use harvest_core::port::producer::mocks::MockProducerSource;
use harvest_core::port::sink::mocks::MemorySink;
use harvest_core::port::MpscSubscriber;

fn service(supervisor: Arc<JobSupervisor>) -> ExtractionService {
    ExtractionService::new(
        Arc::new(JobStore::with_system_providers()),
        Arc::new(SubscriberRegistry::with_system_clock()),
        supervisor,
        Arc::new(MemorySink::new()),
    )
    .with_source("stalled", Arc::new(MockProducerSource::stall_after(4)))
    .with_source("quick", Arc::new(MockProducerSource::records(3)))
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_runs() {
    let supervisor = Arc::new(JobSupervisor::new());
    let service = service(supervisor.clone());

    let quick = service.start(StartExtraction::new("quick")).unwrap();
    let stalled: Vec<String> = (0..3)
        .map(|_| service.start(StartExtraction::new("stalled")).unwrap())
        .collect();

    let store = service.store().clone();
    wait_until(|| store.get(&quick).unwrap().status == JobStatus::Completed).await;
    wait_until(|| {
        stalled
            .iter()
            .all(|id| store.get(id).unwrap().items_processed == 4)
    })
    .await;

    let (channel, mut rx) = MpscSubscriber::channel(16);
    service
        .registry()
        .attach(&stalled[0], Arc::new(channel))
        .await;

    let report = supervisor.shutdown(Duration::from_secs(2)).await;
    // The quick run may still be tracked if it finished after the others started
    assert!(report.finished >= 3);
    assert_eq!(report.aborted, 0);
    assert_eq!(supervisor.active_count(), 0);

    for id in &stalled {
        let job = store.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.items_processed, 4);
        assert!(job.errors[0].starts_with("Extraction cancelled"));
        assert!(job.finished_at.is_some());
    }
    assert_eq!(store.get(&quick).unwrap().status, JobStatus::Completed);

    let last = rx.recv().await.unwrap();
    assert_eq!(last.job_id, stalled[0]);
    assert_eq!(last.status, JobStatus::Failed);

    assert_eq!(service.registry().close_all().await, 1);
    assert_eq!(service.registry().connection_count(&stalled[0]).await, 0);
}

#[tokio::test]
async fn test_janitor_stops_on_shutdown_signal() {
    let store = Arc::new(JobStore::with_system_providers());
    let janitor = JanitorTask::new(store, JanitorConfig::default());
    let (tx, token) = shutdown_channel();

    let handle = tokio::spawn(janitor.run(token));
    tx.shutdown();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("janitor did not stop")
        .unwrap();
}

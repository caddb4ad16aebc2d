//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{job_not_found, to_rpc_error};
use crate::subscription::RpcSubscriberChannel;
use crate::types::{JobRequest, ListJobsRequest, ListJobsResponse, StartRequest, StartResponse};
use harvest_core::application::{ExtractionService, StartExtraction};
use harvest_core::domain::{JobStatus, Snapshot};
use harvest_core::port::SubscriberChannel;
use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::PendingSubscriptionSink;
use std::sync::Arc;
use tracing::{debug, info};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<ExtractionService>,
}

impl RpcHandler {
    pub fn new(service: Arc<ExtractionService>) -> Self {
        Self { service }
    }

    /// extract.start.v1
    pub async fn start(&self, params: StartRequest) -> Result<StartResponse, ErrorObjectOwned> {
        let req = StartExtraction {
            kind: params.kind,
            limit: params.limit,
            force_update: params.force_update,
            options: params.options,
        };
        let kind = req.kind.trim().to_string();

        let job_id = self.service.start(req).map_err(to_rpc_error)?;

        Ok(StartResponse {
            job_id,
            status: JobStatus::Pending.to_string(),
            kind,
        })
    }

    /// jobs.get.v1
    pub async fn get(&self, params: JobRequest) -> Result<Snapshot, ErrorObjectOwned> {
        self.service
            .store()
            .snapshot(&params.job_id)
            .ok_or_else(|| job_not_found(&params.job_id))
    }

    /// jobs.list.v1
    pub async fn list(&self, _params: ListJobsRequest) -> Result<ListJobsResponse, ErrorObjectOwned> {
        let store = self.service.store();
        let jobs = store
            .list()
            .iter()
            .filter_map(|job| store.snapshot(&job.id))
            .collect();

        Ok(ListJobsResponse {
            jobs,
            kinds: self.service.kinds(),
        })
    }

    /// jobs.subscribe.v1
    ///
    /// Sends the current snapshot right away, then every broadcast for the
    /// job until it finishes or the client unsubscribes.
    pub async fn subscribe(
        &self,
        params: JobRequest,
        pending: PendingSubscriptionSink,
    ) -> SubscriptionResult {
        let job_id = params.job_id;
        if self.service.store().get(&job_id).is_none() {
            pending.reject(job_not_found(&job_id)).await;
            return Ok(());
        }

        let sink = pending.accept().await?;
        let channel = Arc::new(RpcSubscriberChannel::new(sink.clone()));
        let registry = self.service.registry();
        let conn_id = registry.attach(&job_id, channel.clone()).await;

        // Read after attaching so no later update can be missed
        if let Some(snapshot) = self.service.store().snapshot(&job_id) {
            if channel.deliver(&snapshot).await.is_err() {
                registry.detach(&job_id, conn_id).await;
                return Ok(());
            }
        }

        tokio::select! {
            _ = sink.closed() => debug!(job_id = %job_id, conn_id, "Subscriber went away"),
            _ = channel.finished() => debug!(job_id = %job_id, conn_id, "Subscription finished"),
        }
        registry.detach(&job_id, conn_id).await;

        info!(job_id = %job_id, conn_id, "Subscription ended");
        Ok(())
    }
}

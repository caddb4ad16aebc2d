//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use harvest_core::domain::{Parameters, Snapshot};
use serde::{Deserialize, Serialize};

/// extract.start.v1 - Start an extraction run
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub kind: String,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub force_update: bool,
    #[serde(default)]
    pub options: Parameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub job_id: String,
    pub status: String,
    pub kind: String,
}

/// jobs.get.v1 and jobs.subscribe.v1 - Address one job
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub job_id: String,
}

/// jobs.list.v1 - List every tracked job
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Snapshot>,
    pub kinds: Vec<String>,
}

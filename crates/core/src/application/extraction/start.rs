// Start Extraction Use Case

use crate::domain::{JobKind, Parameters};
use crate::error::{AppError, Result};
use crate::port::ExtractionParams;
use serde::{Deserialize, Serialize};

/// Request to start one extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartExtraction {
    /// Registered producer kind (e.g. "telegram")
    pub kind: String,

    /// Maximum number of records (None = everything available)
    #[serde(default)]
    pub limit: Option<u64>,

    #[serde(default)]
    pub force_update: bool,

    /// Producer-specific options, passed through untouched
    #[serde(default)]
    pub options: Parameters,
}

impl StartExtraction {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            limit: None,
            force_update: false,
            options: Parameters::new(),
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub(crate) fn job_kind(&self) -> JobKind {
        JobKind::new(self.kind.trim())
    }

    /// Parameters recorded on the job
    pub(crate) fn job_parameters(&self) -> Parameters {
        let mut params = Parameters::new();
        params.insert("kind".to_string(), self.kind.trim().into());
        params.insert("limit".to_string(), self.limit.into());
        params.insert("force_update".to_string(), self.force_update.into());
        params.insert(
            "options".to_string(),
            serde_json::Value::Object(self.options.clone()),
        );
        params
    }

    pub(crate) fn extraction_params(&self) -> ExtractionParams {
        ExtractionParams {
            limit: self.limit,
            force_update: self.force_update,
            options: self.options.clone(),
        }
    }
}

/// Validate the request shape (kind registration is checked by the service)
pub fn validate_request(req: &StartExtraction) -> Result<()> {
    if req.kind.trim().is_empty() {
        return Err(AppError::Validation(
            "Extraction kind cannot be empty".to_string(),
        ));
    }

    if req.limit == Some(0) {
        return Err(AppError::Validation(
            "Limit must be greater than 0 when given".to_string(),
        ));
    }

    Ok(())
}

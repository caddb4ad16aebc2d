// Job Snapshot - the wire view of a job

use crate::domain::{JobId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Serializable view of a job, returned from status queries and pushed to
/// subscribers.
///
/// ```text
/// {
///   "job_id": "550e8400-e29b-41d4-a716-446655440000",
///   "status": "running",
///   "progress": 65,
///   "items_processed": 65,
///   "errors": [],
///   "timestamp": "2025-11-19T10:30:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub items_processed: u64,
    pub errors: Vec<String>,

    /// Delivery/observation time; filled in at broadcast if left empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Keep an existing timestamp, otherwise stamp with `now`
    pub fn stamped(mut self, now: DateTime<Utc>) -> Self {
        self.timestamp.get_or_insert(now);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> Snapshot {
        Snapshot {
            job_id: "job-1".to_string(),
            status: JobStatus::Running,
            progress: 65,
            items_processed: 65,
            errors: vec![],
            timestamp: None,
        }
    }

    #[test]
    fn test_wire_shape() {
        let ts = Utc.with_ymd_and_hms(2025, 11, 19, 10, 30, 0).unwrap();
        let value = serde_json::to_value(snapshot().with_timestamp(ts)).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "job_id": "job-1",
                "status": "running",
                "progress": 65,
                "items_processed": 65,
                "errors": [],
                "timestamp": "2025-11-19T10:30:00Z"
            })
        );
    }

    #[test]
    fn test_stamped_keeps_caller_timestamp() {
        let earlier = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        assert_eq!(
            snapshot().with_timestamp(earlier).stamped(later).timestamp,
            Some(earlier)
        );
        assert_eq!(snapshot().stamped(later).timestamp, Some(later));
    }
}

// Orchestrator constants
use std::time::Duration;

/// Broadcast after this many persisted records (10)
pub const DEFAULT_BROADCAST_EVERY_N_RECORDS: u64 = 10;

/// Broadcast at least this often while records keep arriving (5s)
pub const DEFAULT_BROADCAST_MAX_INTERVAL: Duration = Duration::from_secs(5);

/// Prefix of the failure message when the producer refuses credentials
pub const AUTH_ERROR_PREFIX: &str = "Authentication error";

/// Prefix of every other failure message
pub const EXTRACTION_ERROR_PREFIX: &str = "Extraction error";

/// Failure message of runs stopped by engine shutdown
pub const CANCELLED_MESSAGE: &str = "Extraction cancelled: engine shutting down";

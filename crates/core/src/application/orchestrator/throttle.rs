// Broadcast throttling for the extraction loop

use super::constants::{DEFAULT_BROADCAST_EVERY_N_RECORDS, DEFAULT_BROADCAST_MAX_INTERVAL};
use std::time::Duration;
use tokio::time::Instant;

/// When intermediate progress is pushed to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastPolicy {
    /// Records persisted since the last broadcast
    pub every_n_records: u64,
    /// Time elapsed since the last broadcast
    pub max_interval: Duration,
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self {
            every_n_records: DEFAULT_BROADCAST_EVERY_N_RECORDS,
            max_interval: DEFAULT_BROADCAST_MAX_INTERVAL,
        }
    }
}

/// Fires when either policy threshold is crossed, then resets
pub(crate) struct BroadcastThrottle {
    policy: BroadcastPolicy,
    since_last: u64,
    last: Instant,
}

impl BroadcastThrottle {
    pub(crate) fn new(policy: BroadcastPolicy) -> Self {
        Self {
            policy,
            since_last: 0,
            last: Instant::now(),
        }
    }

    /// Count one persisted record; true when a broadcast is due
    pub(crate) fn record_persisted(&mut self) -> bool {
        self.since_last += 1;

        let due = self.since_last >= self.policy.every_n_records.max(1)
            || self.last.elapsed() >= self.policy.max_interval;
        if due {
            self.since_last = 0;
            self.last = Instant::now();
        }
        due
    }
}

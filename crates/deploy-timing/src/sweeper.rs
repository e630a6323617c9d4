//! Retention sweep for long-terminated deployments.
//!
//! Without this the id → record map grows for as long as the process lives.
//! The sweep is opportunistic (views run it when they mount) and only ever
//! touches records that carry a termination time.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::store::TimingStore;

/// Default retention for terminated records (24 hours).
pub const DEFAULT_RETENTION_HOURS: u64 = 24;

/// Removes records whose deployment terminated more than `retention` ago.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    store: TimingStore,
    retention: Duration,
}

impl RetentionSweeper {
    #[must_use]
    pub fn new(store: TimingStore, retention: Duration) -> Self {
        Self { store, retention }
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Drop expired records and return how many were removed.
    ///
    /// Idempotent; in-flight deployments are never removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let retention = self.retention;
        let removed = self.store.retain(|_, record| match record.terminated_at() {
            Some(terminated_at) => now - terminated_at <= retention,
            None => true,
        });

        if removed > 0 {
            info!(
                removed,
                remaining = self.store.len(),
                retention_hours = retention.num_hours(),
                "Swept terminated deployment timings"
            );
        } else {
            debug!("Retention sweep: nothing to remove");
        }

        removed
    }
}

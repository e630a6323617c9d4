//! Environment lock countdowns and cache invalidation on expiry.
//!
//! - [`LockExpiryWatcher`] is the pure per-tick decision
//! - [`CacheInvalidator`] is the seam to the data-fetch layer
//! - [`LockView`] wires a watcher to the shared clock for one mounted view

mod watcher;

pub use watcher::{InvalidationPolicy, LockCountdown, LockExpiryWatcher, UNLIMITED_LABEL};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TimingError;
use crate::snapshot::{EnvironmentLock, LockDeadline};

/// Cached collections whose contents depend on lock eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryKey {
    AllEnvironments,
    EnabledEnvironments,
    UserLockedEnvironments,
}

impl QueryKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllEnvironments => "all-environments",
            Self::EnabledEnvironments => "enabled-environments",
            Self::UserLockedEnvironments => "user-locked-environments",
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything refetched when a watched lock expires.
pub const LOCK_EXPIRY_QUERY_KEYS: [QueryKey; 3] = [
    QueryKey::AllEnvironments,
    QueryKey::EnabledEnvironments,
    QueryKey::UserLockedEnvironments,
];

/// Data-fetch layer hook for dropping cached query results.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, keys: &[QueryKey]) -> Result<(), TimingError>;
}

/// A mounted lock countdown.
///
/// Recomputes on every clock tick, publishes the countdown, and calls the
/// invalidator when the watcher says so. Unmounting (or dropping) stops it.
#[derive(Debug)]
pub struct LockView {
    countdown: watch::Receiver<LockCountdown>,
    expiry: watch::Sender<Option<DateTime<Utc>>>,
    cancel: CancellationToken,
}

impl LockView {
    /// Mount a countdown on `ticks`. Must be called inside a tokio runtime.
    #[must_use]
    pub fn mount(
        mut ticks: watch::Receiver<DateTime<Utc>>,
        mut watcher: LockExpiryWatcher,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        let initial = watcher.on_tick(*ticks.borrow_and_update());
        let (countdown_tx, countdown) = watch::channel(initial.clone());
        let (expiry, mut expiry_rx) = watch::channel(watcher.expires_at());
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            if initial.invalidate {
                run_invalidation(invalidator.as_ref()).await;
            }

            loop {
                let now = tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    changed = expiry_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        watcher.set_expiry(*expiry_rx.borrow_and_update());
                        *ticks.borrow()
                    }
                    changed = ticks.changed() => {
                        if changed.is_err() {
                            debug!("Clock stopped, unmounting lock countdown");
                            break;
                        }
                        *ticks.borrow_and_update()
                    }
                };

                let countdown = watcher.on_tick(now);
                if countdown.invalidate {
                    run_invalidation(invalidator.as_ref()).await;
                }
                countdown_tx.send_replace(countdown);
            }
        });

        Self {
            countdown,
            expiry,
            cancel,
        }
    }

    /// Mount a countdown for one deadline of a polled lock.
    #[must_use]
    pub fn mount_for_lock(
        ticks: watch::Receiver<DateTime<Utc>>,
        lock: &EnvironmentLock,
        which: LockDeadline,
        policy: InvalidationPolicy,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self::mount(
            ticks,
            LockExpiryWatcher::new(lock.deadline(which), policy),
            invalidator,
        )
    }

    /// Latest countdown.
    #[must_use]
    pub fn current(&self) -> LockCountdown {
        self.countdown.borrow().clone()
    }

    /// Receiver for the rendering layer.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LockCountdown> {
        self.countdown.clone()
    }

    /// Update the deadline after a fresh poll.
    pub fn set_expiry(&self, expires_at: Option<DateTime<Utc>>) {
        self.expiry.send_if_modified(|current| {
            if *current == expires_at {
                false
            } else {
                *current = expires_at;
                true
            }
        });
    }

    pub fn unmount(&self) {
        self.cancel.cancel();
    }
}

impl Drop for LockView {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_invalidation(invalidator: &dyn CacheInvalidator) {
    info!(
        keys = ?LOCK_EXPIRY_QUERY_KEYS.map(QueryKey::as_str),
        "Lock deadline crossed, invalidating environment queries"
    );
    if let Err(e) = invalidator.invalidate(&LOCK_EXPIRY_QUERY_KEYS).await {
        warn!(error = %e, "Failed to invalidate environment queries");
    }
}

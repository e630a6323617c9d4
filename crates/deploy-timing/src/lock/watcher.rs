//! Per-tick lock countdown and the deadline-crossing decision.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::format::{format_countdown, humanize_remaining};
use crate::steps::secs;

/// Label rendered when a lock never expires.
pub const UNLIMITED_LABEL: &str = "Unlimited";

/// When to ask the cache layer to refetch once a lock has expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InvalidationPolicy {
    /// Once, on the tick that first sees the deadline crossed. Re-armed when
    /// the watched deadline changes.
    #[default]
    OneShot,
    /// On every expired tick, but no more often than `min_interval_secs`.
    RateLimited { min_interval_secs: u64 },
}

/// Countdown state for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockCountdown {
    /// `D:HH:MM`, `HH:MM:SS` or `Unlimited`
    pub label: String,
    /// `"1 minute"`, `"3 hours"`; absent when unlimited or expired
    pub tier: Option<String>,
    #[serde(skip)]
    pub remaining: Option<Duration>,
    pub expired: bool,
    /// Whether this tick should trigger cache invalidation
    #[serde(skip)]
    pub invalidate: bool,
}

impl LockCountdown {
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            label: UNLIMITED_LABEL.to_string(),
            tier: None,
            remaining: None,
            expired: false,
            invalidate: false,
        }
    }
}

impl Default for LockCountdown {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Watches one lock deadline.
///
/// Feed it every clock tick through [`LockExpiryWatcher::on_tick`]; the
/// returned countdown says whether the cache must be invalidated.
#[derive(Debug, Clone)]
pub struct LockExpiryWatcher {
    expires_at: Option<DateTime<Utc>>,
    policy: InvalidationPolicy,
    fired: bool,
    last_invalidated: Option<DateTime<Utc>>,
}

impl LockExpiryWatcher {
    #[must_use]
    pub fn new(expires_at: Option<DateTime<Utc>>, policy: InvalidationPolicy) -> Self {
        Self {
            expires_at,
            policy,
            fired: false,
            last_invalidated: None,
        }
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Replace the watched deadline (e.g. after a fresh poll).
    ///
    /// A different deadline re-arms the watcher; the same one is a no-op.
    pub fn set_expiry(&mut self, expires_at: Option<DateTime<Utc>>) {
        if self.expires_at != expires_at {
            self.expires_at = expires_at;
            self.fired = false;
            self.last_invalidated = None;
        }
    }

    /// Compute the countdown for `now`.
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> LockCountdown {
        let Some(expires_at) = self.expires_at else {
            return LockCountdown::unlimited();
        };

        let remaining = expires_at - now;
        if remaining > Duration::zero() {
            return LockCountdown {
                label: format_countdown(remaining),
                tier: Some(humanize_remaining(remaining)),
                remaining: Some(remaining),
                expired: false,
                invalidate: false,
            };
        }

        LockCountdown {
            label: format_countdown(Duration::zero()),
            tier: None,
            remaining: Some(Duration::zero()),
            expired: true,
            invalidate: self.should_invalidate(now),
        }
    }

    fn should_invalidate(&mut self, now: DateTime<Utc>) -> bool {
        match self.policy {
            InvalidationPolicy::OneShot => {
                if self.fired {
                    return false;
                }
                self.fired = true;
                true
            }
            InvalidationPolicy::RateLimited { min_interval_secs } => {
                let min_interval = secs(min_interval_secs);
                let due = self
                    .last_invalidated
                    .is_none_or(|last| now - last >= min_interval);
                if due {
                    self.last_invalidated = Some(now);
                }
                due
            }
        }
    }
}

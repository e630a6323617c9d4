//! Shared display clock.
//!
//! A single [`ClockTick`] broadcasts "now" once per period to every
//! countdown and progress consumer so they advance in lockstep. Each tick
//! takes a fresh reading from the injected [`Clock`]; nothing accumulates
//! deltas, so wall-clock adjustments are picked up on the next tick.

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Source of wall-clock time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used for replays and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Default display refresh period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Running periodic clock.
///
/// Stopping (explicitly or by dropping the handle) ends the ticking task and
/// closes the channel, so subscribers see `changed()` fail and wind down.
#[derive(Debug)]
pub struct ClockTick {
    clock: Arc<dyn Clock>,
    rx: watch::Receiver<DateTime<Utc>>,
    cancel: CancellationToken,
    period: Duration,
}

impl ClockTick {
    /// Start ticking every `period`, at least every millisecond. Must be
    /// called inside a tokio runtime.
    #[must_use]
    pub fn start(clock: Arc<dyn Clock>, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let (tx, rx) = watch::channel(clock.now());
        let cancel = CancellationToken::new();

        let task_clock = Arc::clone(&clock);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                period_ms = period.as_millis() as u64,
                "Display clock started"
            );

            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let now = task_clock.now();
                        tx.send_replace(now);
                        debug!(%now, subscribers = tx.receiver_count(), "tick");
                    }
                }
            }

            info!("Display clock stopped");
        });

        Self {
            clock,
            rx,
            cancel,
            period,
        }
    }

    /// Receiver that is notified on every tick.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DateTime<Utc>> {
        self.rx.clone()
    }

    /// Value broadcast by the most recent tick.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        *self.rx.borrow()
    }

    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ClockTick {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

//! Lock expiry countdown tests
//!
//! Mounted lock countdowns on a paused tokio clock, checking the published
//! labels and how often the cache invalidator is called.
//!
//! Run with:
//! ```sh
//! cargo test -p deploy-timing --test lock_expiry_tests
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_test::assert_err;

use deploy_timing::{
    CacheInvalidator, Clock, EnvironmentLock, InvalidationPolicy, LockCountdown, LockDeadline,
    ManualClock, QueryKey, TimingConfig, TimingError, Tracker, LOCK_EXPIRY_QUERY_KEYS,
};

fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_557_600, 0).unwrap()
}

/// Records every invalidation request.
#[derive(Default)]
struct RecordingInvalidator {
    calls: Mutex<Vec<Vec<QueryKey>>>,
    fail: bool,
}

impl RecordingInvalidator {
    fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn invalidate(&self, keys: &[QueryKey]) -> Result<(), TimingError> {
        self.calls.lock().unwrap().push(keys.to_vec());
        if self.fail {
            return Err(TimingError::Invalidation("cache offline".to_string()));
        }
        Ok(())
    }
}

fn setup(policy: InvalidationPolicy) -> (Tracker, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let config = TimingConfig {
        invalidation: policy,
        ..TimingConfig::default()
    };
    (Tracker::new(config, clock.clone()), clock)
}

fn lock_expiring(at: Option<DateTime<Utc>>) -> EnvironmentLock {
    EnvironmentLock {
        locked_by: Some("alice".to_string()),
        locked_at: Some(t0() - Duration::hours(1)),
        lock_will_expire_at: at,
        lock_reservation_will_expire_at: at.map(|at| at - Duration::minutes(30)),
    }
}

/// Advance the wall clock one second and wait for the next published countdown.
async fn tick(clock: &ManualClock, rx: &mut watch::Receiver<LockCountdown>) -> LockCountdown {
    clock.advance(Duration::seconds(1));
    rx.changed().await.unwrap();
    rx.borrow_and_update().clone()
}

#[tokio::test(start_paused = true)]
async fn test_expiry_invalidates_exactly_once() {
    let (tracker, clock) = setup(InvalidationPolicy::OneShot);
    let ticks = tracker.start_clock();
    let invalidator = Arc::new(RecordingInvalidator::default());

    let lock = lock_expiring(Some(t0() + Duration::seconds(3)));
    let view = tracker.mount_lock(&ticks, &lock, LockDeadline::Lock, invalidator.clone());
    let mut rx = view.subscribe();

    assert_eq!(view.current().label, "00:00:03");
    assert_eq!(view.current().tier.as_deref(), Some("1 minute"));

    let mut expired_ticks = 0;
    for _ in 0..10 {
        let countdown = tick(&clock, &mut rx).await;
        if countdown.expired {
            expired_ticks += 1;
            assert_eq!(countdown.label, "00:00:00");
        }
    }

    assert_eq!(expired_ticks, 8);
    assert_eq!(invalidator.calls(), 1);
    assert_eq!(
        invalidator.calls.lock().unwrap()[0],
        LOCK_EXPIRY_QUERY_KEYS.to_vec()
    );
}

#[tokio::test(start_paused = true)]
async fn test_reservation_deadline_is_watched_separately() {
    let (tracker, clock) = setup(InvalidationPolicy::OneShot);
    let ticks = tracker.start_clock();
    let invalidator = Arc::new(RecordingInvalidator::default());

    let lock = lock_expiring(Some(t0() + Duration::minutes(30) + Duration::seconds(2)));
    let lock_view = tracker.mount_lock(&ticks, &lock, LockDeadline::Lock, invalidator.clone());
    let reservation_view =
        tracker.mount_lock(&ticks, &lock, LockDeadline::Reservation, invalidator.clone());
    let mut rx = reservation_view.subscribe();

    for _ in 0..5 {
        tick(&clock, &mut rx).await;
    }

    assert!(reservation_view.current().expired);
    assert!(!lock_view.current().expired);
    assert_eq!(lock_view.current().tier.as_deref(), Some("30 minutes"));
    assert_eq!(invalidator.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unlimited_lock_never_invalidates() {
    let (tracker, clock) = setup(InvalidationPolicy::OneShot);
    let ticks = tracker.start_clock();
    let invalidator = Arc::new(RecordingInvalidator::default());

    let view = tracker.mount_lock(
        &ticks,
        &lock_expiring(None),
        LockDeadline::Lock,
        invalidator.clone(),
    );
    let mut rx = view.subscribe();

    for _ in 0..5 {
        let countdown = tick(&clock, &mut rx).await;
        assert_eq!(countdown.label, "Unlimited");
        assert!(countdown.tier.is_none());
    }
    assert_eq!(invalidator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_new_deadline_rearms_invalidation() {
    let (tracker, clock) = setup(InvalidationPolicy::OneShot);
    let ticks = tracker.start_clock();
    let invalidator = Arc::new(RecordingInvalidator::default());

    let view = tracker.mount_lock(
        &ticks,
        &lock_expiring(Some(t0() + Duration::seconds(1))),
        LockDeadline::Lock,
        invalidator.clone(),
    );
    let mut rx = view.subscribe();

    for _ in 0..3 {
        tick(&clock, &mut rx).await;
    }
    assert_eq!(invalidator.calls(), 1);

    // Lock extended after a refetch, then lapses again.
    view.set_expiry(Some(clock.now() + Duration::seconds(2)));
    for _ in 0..6 {
        tick(&clock, &mut rx).await;
    }
    assert_eq!(invalidator.calls(), 2);
    assert!(view.current().expired);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_policy_repeats() {
    let (tracker, clock) = setup(InvalidationPolicy::RateLimited {
        min_interval_secs: 3,
    });
    let ticks = tracker.start_clock();
    let invalidator = Arc::new(RecordingInvalidator::default());

    let view = tracker.mount_lock(
        &ticks,
        &lock_expiring(Some(t0())),
        LockDeadline::Lock,
        invalidator.clone(),
    );
    let mut rx = view.subscribe();

    for _ in 0..9 {
        tick(&clock, &mut rx).await;
    }

    // Mount at t0, then t0+3s, t0+6s, t0+9s.
    assert_eq!(invalidator.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_invalidation_failure_keeps_countdown_running() {
    let (tracker, clock) = setup(InvalidationPolicy::OneShot);
    let ticks = tracker.start_clock();
    let invalidator = Arc::new(RecordingInvalidator {
        fail: true,
        ..RecordingInvalidator::default()
    });

    let view = tracker.mount_lock(
        &ticks,
        &lock_expiring(Some(t0() + Duration::seconds(1))),
        LockDeadline::Lock,
        invalidator.clone(),
    );
    let mut rx = view.subscribe();

    for _ in 0..4 {
        tick(&clock, &mut rx).await;
    }
    assert_eq!(invalidator.calls(), 1);
    assert!(view.current().expired);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_stops_countdown() {
    let (tracker, _clock) = setup(InvalidationPolicy::OneShot);
    let ticks = tracker.start_clock();
    let invalidator = Arc::new(RecordingInvalidator::default());

    let view = tracker.mount_lock(
        &ticks,
        &lock_expiring(Some(t0() + Duration::days(2))),
        LockDeadline::Lock,
        invalidator.clone(),
    );
    let mut rx = view.subscribe();
    assert_eq!(view.current().label, "2:00:00");

    view.unmount();
    assert_err!(rx.changed().await);
    assert_eq!(invalidator.calls(), 0);
}

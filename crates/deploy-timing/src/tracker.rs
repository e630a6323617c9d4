//! Application-root handle tying the store, step definitions and clock together.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::{Clock, ClockTick, SystemClock};
use crate::config::TimingConfig;
use crate::estimator::{estimate, DeploymentProgress};
use crate::lock::{CacheInvalidator, LockView};
use crate::record::Transition;
use crate::snapshot::{DeploymentSnapshot, EnvironmentLock, LockDeadline};
use crate::state::DeploymentId;
use crate::steps::StepDefinitions;
use crate::store::TimingStore;
use crate::sweeper::RetentionSweeper;
use crate::view::DeploymentView;

/// Owns everything a deployment or lock view needs.
///
/// Create one per application and clone it into views; clones share the same
/// store so timings survive navigation.
#[derive(Debug, Clone)]
pub struct Tracker {
    config: Arc<TimingConfig>,
    store: TimingStore,
    steps: Arc<StepDefinitions>,
    sweeper: RetentionSweeper,
    clock: Arc<dyn Clock>,
}

impl Tracker {
    #[must_use]
    pub fn new(config: TimingConfig, clock: Arc<dyn Clock>) -> Self {
        let store = TimingStore::new();
        let sweeper = RetentionSweeper::new(store.clone(), config.retention());
        Self {
            steps: Arc::new(config.step_definitions()),
            config: Arc::new(config),
            store,
            sweeper,
            clock,
        }
    }

    #[must_use]
    pub fn with_system_clock(config: TimingConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &TimingStore {
        &self.store
    }

    #[must_use]
    pub fn steps(&self) -> &StepDefinitions {
        &self.steps
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Record a polled snapshot at the current time.
    pub fn observe(&self, snapshot: &DeploymentSnapshot) -> Transition {
        self.store.observe(snapshot, self.clock.now())
    }

    /// Progress for `id` at `now`; defaults if the deployment is not tracked.
    #[must_use]
    pub fn progress(&self, id: &DeploymentId, now: DateTime<Utc>) -> DeploymentProgress {
        estimate(self.store.get(id).as_ref(), &self.steps, now)
    }

    /// Drop timings of deployments that terminated outside the retention window.
    pub fn sweep(&self) -> usize {
        self.sweeper.sweep(self.clock.now())
    }

    /// Start the shared display clock.
    #[must_use]
    pub fn start_clock(&self) -> ClockTick {
        ClockTick::start(Arc::clone(&self.clock), self.config.tick_interval())
    }

    /// Mount a pipeline view for one deployment.
    #[must_use]
    pub fn mount_deployment(&self, id: DeploymentId, clock: &ClockTick) -> DeploymentView {
        DeploymentView::mount(self.clone(), id, clock.subscribe())
    }

    /// Mount a countdown for one deadline of an environment lock.
    #[must_use]
    pub fn mount_lock(
        &self,
        clock: &ClockTick,
        lock: &EnvironmentLock,
        which: LockDeadline,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> LockView {
        LockView::mount_for_lock(
            clock.subscribe(),
            lock,
            which,
            self.config.invalidation,
            invalidator,
        )
    }
}

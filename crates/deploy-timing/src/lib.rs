//! Live timing for deployment pipelines and environment locks.
//!
//! Deployment status arrives as periodic polled snapshots with no timestamps.
//! This crate remembers when each pipeline step was first observed and, on
//! every tick of a shared clock, turns that into per-step progress, remaining
//! time and total duration. The same clock drives lock-expiry countdowns,
//! which ask the data-fetch layer to refetch environment queries once a
//! deadline passes.
//!
//! # Usage
//!
//! ```no_run
//! use deploy_timing::{DeploymentSnapshot, DeploymentState, TimingConfig, Tracker};
//!
//! # async fn run() -> deploy_timing::Result<()> {
//! let tracker = Tracker::with_system_clock(TimingConfig::from_env()?);
//! let clock = tracker.start_clock();
//!
//! let view = tracker.mount_deployment("42".into(), &clock);
//! view.push(DeploymentSnapshot::new("42", DeploymentState::InProgress));
//!
//! let mut panels = view.subscribe();
//! while panels.changed().await.is_ok() {
//!     let panel = panels.borrow_and_update().clone();
//!     println!("{}", panel.progress.total_remaining_label);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! See [`config`] for the TOML keys and environment overrides.
//!
//! # Architecture
//!
//! - [`TimingRecord`] is the per-deployment step state machine
//! - [`TimingStore`] keeps records for the application's lifetime
//! - [`estimate`] is the pure progress calculation
//! - [`ClockTick`] broadcasts the current time to mounted views
//! - [`DeploymentView`] and [`LockView`] recompute on each tick until unmounted

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod error;
pub mod estimator;
pub mod format;
pub mod lock;
pub mod poller;
pub mod record;
pub mod scenario;
pub mod snapshot;
pub mod state;
pub mod steps;
pub mod store;
pub mod sweeper;
pub mod tracker;
pub mod view;

pub use clock::{Clock, ClockTick, ManualClock, SystemClock, DEFAULT_TICK_INTERVAL};
pub use config::TimingConfig;
pub use error::{Result, TimingError};
pub use estimator::{estimate, DeploymentProgress, StepStatus, StepView};
pub use format::{format_countdown, format_duration, humanize_remaining};
pub use lock::{
    CacheInvalidator, InvalidationPolicy, LockCountdown, LockExpiryWatcher, LockView, QueryKey,
    LOCK_EXPIRY_QUERY_KEYS,
};
pub use poller::{DeploymentPoller, DeploymentSource};
pub use record::{TimingRecord, Transition};
pub use scenario::{ReplayFrame, Scenario, TimedSnapshot};
pub use snapshot::{DeploymentSnapshot, EnvironmentLock, LockDeadline};
pub use state::{DeploymentId, DeploymentState, TerminalClass};
pub use steps::{StepDefinition, StepDefinitions, StepEstimates};
pub use store::TimingStore;
pub use sweeper::RetentionSweeper;
pub use tracker::Tracker;
pub use view::{DeploymentPanel, DeploymentView};

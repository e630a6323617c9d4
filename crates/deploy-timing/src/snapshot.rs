//! Polled snapshots handed in by the data-fetch layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{DeploymentId, DeploymentState};

/// One polled view of a deployment.
///
/// Every field is optional on the wire; a snapshot without an id or state is
/// ignored by the store rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSnapshot {
    #[serde(default)]
    pub id: Option<DeploymentId>,
    #[serde(default)]
    pub state: Option<DeploymentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_run_url: Option<String>,
}

impl DeploymentSnapshot {
    #[must_use]
    pub fn new(id: impl Into<DeploymentId>, state: DeploymentState) -> Self {
        Self {
            id: Some(id.into()),
            state: Some(state),
            workflow_run_url: None,
        }
    }

    /// Whether this snapshot reports a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_some_and(DeploymentState::is_terminal)
    }
}

/// Which deadline of an environment lock to watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockDeadline {
    /// The lock itself expires
    Lock,
    /// Other users become eligible to unlock
    Reservation,
}

/// Polled lock fields of an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentLock {
    #[serde(default)]
    pub locked_by: Option<String>,
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lock_will_expire_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lock_reservation_will_expire_at: Option<DateTime<Utc>>,
}

impl EnvironmentLock {
    #[must_use]
    pub fn deadline(&self, which: LockDeadline) -> Option<DateTime<Utc>> {
        match which {
            LockDeadline::Lock => self.lock_will_expire_at,
            LockDeadline::Reservation => self.lock_reservation_will_expire_at,
        }
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }
}

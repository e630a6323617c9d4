//! Per-deployment timing record and the step sequence state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::state::DeploymentState;

/// Timing data kept for a single deployment.
///
/// Start times are written at most once per state and `terminated_at` is
/// written at most once; the only mutation path is [`TimingRecord::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingRecord {
    last_known_state: Option<DeploymentState>,
    step_start_times: HashMap<DeploymentState, DateTime<Utc>>,
    terminated_at: Option<DateTime<Utc>>,
}

/// Outcome of applying an observed state to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Snapshot lacked an id or a state
    Ignored,
    /// Same state as last time; nothing changed
    Unchanged,
    /// A new step started at the observed time
    Advanced {
        from: Option<DeploymentState>,
        to: DeploymentState,
    },
    /// `PENDING` reused the start time recorded for `REQUESTED`
    InheritedStart,
    /// The deployment entered a terminal state for the first time
    Terminated { state: DeploymentState },
}

impl TimingRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn last_known_state(&self) -> Option<DeploymentState> {
        self.last_known_state
    }

    #[must_use]
    pub fn step_start(&self, state: DeploymentState) -> Option<DateTime<Utc>> {
        self.step_start_times.get(&state).copied()
    }

    #[must_use]
    pub fn terminated_at(&self) -> Option<DateTime<Utc>> {
        self.terminated_at
    }

    /// Earliest recorded start time across all observed states.
    #[must_use]
    pub fn first_start(&self) -> Option<DateTime<Utc>> {
        self.step_start_times.values().min().copied()
    }

    /// Feed an observed state into the record.
    ///
    /// Level-triggered: re-observing `last_known_state` is a no-op.
    pub fn apply(&mut self, state: DeploymentState, now: DateTime<Utc>) -> Transition {
        if self.last_known_state == Some(state) {
            return Transition::Unchanged;
        }

        let from = self.last_known_state.replace(state);

        // REQUESTED and PENDING render as one pre-deployment phase, so PENDING
        // keeps the clock REQUESTED started instead of starting its own.
        if from == Some(DeploymentState::Requested) && state == DeploymentState::Pending {
            if let Some(requested_at) = self.step_start(DeploymentState::Requested) {
                self.step_start_times
                    .entry(DeploymentState::Pending)
                    .or_insert(requested_at);
                return Transition::InheritedStart;
            }
        }

        self.step_start_times.entry(state).or_insert(now);

        if state.is_terminal() && self.terminated_at.is_none() {
            self.terminated_at = Some(now);
            return Transition::Terminated { state };
        }

        Transition::Advanced { from, to: state }
    }
}

//! Visual pipeline steps and their estimated durations.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::state::DeploymentState;

/// Largest accepted per-step estimate (100 years).
pub const MAX_STEP_SECS: u64 = 100 * 365 * 86_400;

/// Per-step estimates in seconds, as they appear in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEstimates {
    #[serde(default = "default_requested_secs")]
    pub requested_secs: u64,
    #[serde(default = "default_pending_secs")]
    pub pending_secs: u64,
    #[serde(default = "default_in_progress_secs")]
    pub in_progress_secs: u64,
}

fn default_requested_secs() -> u64 {
    10
}
fn default_pending_secs() -> u64 {
    30
}
fn default_in_progress_secs() -> u64 {
    180
}

impl Default for StepEstimates {
    fn default() -> Self {
        Self {
            requested_secs: default_requested_secs(),
            pending_secs: default_pending_secs(),
            in_progress_secs: default_in_progress_secs(),
        }
    }
}

/// One step of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    /// Server state that marks this step as running
    pub state: DeploymentState,
    /// Display name
    pub name: String,
    /// Expected time spent in this step
    pub estimated: Duration,
}

/// Ordered pipeline `REQUESTED → PENDING → IN_PROGRESS`.
///
/// States outside the sequence never occupy a step slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinitions {
    steps: Vec<StepDefinition>,
}

impl StepDefinitions {
    #[must_use]
    pub fn new(requested: Duration, pending: Duration, in_progress: Duration) -> Self {
        Self {
            steps: vec![
                StepDefinition {
                    state: DeploymentState::Requested,
                    name: "Pre-deployment".to_string(),
                    estimated: requested,
                },
                StepDefinition {
                    state: DeploymentState::Pending,
                    name: "Pending".to_string(),
                    estimated: pending,
                },
                StepDefinition {
                    state: DeploymentState::InProgress,
                    name: "In progress".to_string(),
                    estimated: in_progress,
                },
            ],
        }
    }

    #[must_use]
    pub fn from_estimates(estimates: &StepEstimates) -> Self {
        Self::new(
            secs(estimates.requested_secs),
            secs(estimates.pending_secs),
            secs(estimates.in_progress_secs),
        )
    }

    /// Index of the step `state` occupies, if any.
    #[must_use]
    pub fn position(&self, state: DeploymentState) -> Option<usize> {
        self.steps.iter().position(|step| step.state == state)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of all estimates.
    #[must_use]
    pub fn total_estimate(&self) -> Duration {
        self.steps
            .iter()
            .fold(Duration::zero(), |acc, step| saturating_add(acc, step.estimated))
    }
}

impl Default for StepDefinitions {
    fn default() -> Self {
        Self::from_estimates(&StepEstimates::default())
    }
}

/// Seconds as a [`Duration`], saturating instead of overflowing.
pub(crate) fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX).min(i64::MAX / 1000))
}

/// `a + b`, clamped to [`Duration::MAX`] instead of panicking.
pub(crate) fn saturating_add(a: Duration, b: Duration) -> Duration {
    a.checked_add(&b).unwrap_or(Duration::MAX)
}

impl StepEstimates {
    /// Estimates outside `0..=MAX_STEP_SECS`, by config key.
    pub(crate) fn out_of_range(&self) -> Option<(&'static str, u64)> {
        [
            ("requested_secs", self.requested_secs),
            ("pending_secs", self.pending_secs),
            ("in_progress_secs", self.in_progress_secs),
        ]
        .into_iter()
        .find(|(_, value)| *value > MAX_STEP_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_order() {
        let steps = StepDefinitions::default();
        let states: Vec<_> = steps.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                DeploymentState::Requested,
                DeploymentState::Pending,
                DeploymentState::InProgress
            ]
        );
        assert_eq!(steps.total_estimate(), Duration::seconds(220));
    }

    #[test]
    fn test_total_estimate_saturates() {
        let huge = secs(u64::MAX);
        let steps = StepDefinitions::new(huge, huge, huge);
        assert_eq!(steps.total_estimate(), Duration::MAX);
    }

    #[test]
    fn test_out_of_range_estimates() {
        assert_eq!(StepEstimates::default().out_of_range(), None);
        let estimates = StepEstimates {
            pending_secs: MAX_STEP_SECS + 1,
            ..StepEstimates::default()
        };
        assert_eq!(
            estimates.out_of_range(),
            Some(("pending_secs", MAX_STEP_SECS + 1))
        );
    }

    #[test]
    fn test_non_pipeline_states_have_no_slot() {
        let steps = StepDefinitions::default();
        assert_eq!(steps.position(DeploymentState::Pending), Some(1));
        assert_eq!(steps.position(DeploymentState::Success), None);
        assert_eq!(steps.position(DeploymentState::Queued), None);
    }
}

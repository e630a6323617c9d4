//! Progress and remaining-time estimates for the deployment pipeline.
//!
//! Everything here is a pure function of a timing record, the step
//! definitions and `now`. Callers recompute on every clock tick so the values
//! advance between polls. Missing input yields defaults, never an error.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::format::format_duration;
use crate::record::TimingRecord;
use crate::state::{DeploymentState, TerminalClass};
use crate::steps::{saturating_add, StepDefinition, StepDefinitions};

/// Display status of a single pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Active,
    Error,
    Upcoming,
    Unknown,
    Inactive,
}

/// View model for one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub name: String,
    pub status: StepStatus,
    /// Always within `[0, 1]`
    pub progress_fraction: f64,
    #[serde(skip)]
    pub remaining: Duration,
    pub remaining_time_label: String,
}

/// Everything the pipeline visualization needs for one deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProgress {
    pub steps: Vec<StepView>,
    #[serde(skip)]
    pub total_remaining: Duration,
    pub total_remaining_label: String,
    #[serde(skip)]
    pub duration: Option<Duration>,
    pub duration_label: String,
    pub classification: TerminalClass,
}

impl DeploymentProgress {
    /// Defaults for a deployment we have no timing data for.
    #[must_use]
    pub fn unknown(steps: &StepDefinitions) -> Self {
        Self {
            steps: steps
                .iter()
                .map(|step| StepView {
                    name: step.name.clone(),
                    status: StepStatus::Unknown,
                    progress_fraction: 0.0,
                    remaining: Duration::zero(),
                    remaining_time_label: String::new(),
                })
                .collect(),
            total_remaining: Duration::zero(),
            total_remaining_label: String::new(),
            duration: None,
            duration_label: String::new(),
            classification: TerminalClass::Unknown,
        }
    }

    /// The step currently running, if any.
    #[must_use]
    pub fn active_step(&self) -> Option<&StepView> {
        self.steps.iter().find(|s| s.status == StepStatus::Active)
    }
}

/// Compute the progress view for `record` at `now`.
#[must_use]
pub fn estimate(
    record: Option<&TimingRecord>,
    steps: &StepDefinitions,
    now: DateTime<Utc>,
) -> DeploymentProgress {
    let Some(record) = record else {
        return DeploymentProgress::unknown(steps);
    };
    let Some(state) = record.last_known_state() else {
        return DeploymentProgress::unknown(steps);
    };

    let statuses = step_statuses(record, state, steps);
    let end = record.terminated_at().unwrap_or(now);

    let mut views = Vec::with_capacity(steps.len());
    let mut total_remaining = Duration::zero();
    let mut active_elapsed = None;

    for (step, status) in steps.iter().zip(statuses) {
        let (fraction, remaining, label) = match status {
            StepStatus::Completed => (1.0, Duration::zero(), String::new()),
            StepStatus::Active => {
                let elapsed = elapsed_in(record, step, end);
                active_elapsed = Some(elapsed);
                let remaining = (step.estimated - elapsed).max(Duration::zero());
                (fraction(elapsed, step.estimated), remaining, format_duration(remaining))
            }
            StepStatus::Error => {
                let elapsed = elapsed_in(record, step, end);
                (fraction(elapsed, step.estimated), Duration::zero(), String::new())
            }
            StepStatus::Upcoming => (0.0, step.estimated, format_duration(step.estimated)),
            StepStatus::Unknown | StepStatus::Inactive => (0.0, Duration::zero(), String::new()),
        };

        if matches!(status, StepStatus::Active | StepStatus::Upcoming) {
            total_remaining = saturating_add(total_remaining, step.estimated);
        }

        views.push(StepView {
            name: step.name.clone(),
            status,
            progress_fraction: fraction,
            remaining,
            remaining_time_label: label,
        });
    }

    // Overrun of the active step eats into the budget of the steps after it.
    let total_remaining = match active_elapsed {
        Some(elapsed) => (total_remaining - elapsed).max(Duration::zero()),
        None => Duration::zero(),
    };

    // Counted from the first observed state, pipeline or not.
    let duration = record
        .first_start()
        .map(|start| (end - start).max(Duration::zero()));

    DeploymentProgress {
        steps: views,
        total_remaining,
        total_remaining_label: if active_elapsed.is_some() {
            format_duration(total_remaining)
        } else {
            String::new()
        },
        duration,
        duration_label: duration.map(format_duration).unwrap_or_default(),
        classification: state.classify(),
    }
}

fn step_statuses(
    record: &TimingRecord,
    state: DeploymentState,
    steps: &StepDefinitions,
) -> Vec<StepStatus> {
    let positioned = |current: usize, at_current: StepStatus| -> Vec<StepStatus> {
        (0..steps.len())
            .map(|i| match i.cmp(&current) {
                std::cmp::Ordering::Less => StepStatus::Completed,
                std::cmp::Ordering::Equal => at_current,
                std::cmp::Ordering::Greater => StepStatus::Upcoming,
            })
            .collect()
    };

    if let Some(current) = steps.position(state) {
        return positioned(current, StepStatus::Active);
    }

    match state {
        DeploymentState::Success => vec![StepStatus::Completed; steps.len()],
        DeploymentState::Error | DeploymentState::Failure => {
            // The failing step is the furthest one that ever started.
            let furthest = steps
                .iter()
                .enumerate()
                .filter(|(_, step)| record.step_start(step.state).is_some())
                .map(|(i, _)| i)
                .max()
                .unwrap_or(0);
            positioned(furthest, StepStatus::Error)
        }
        DeploymentState::Inactive => vec![StepStatus::Inactive; steps.len()],
        _ => vec![StepStatus::Unknown; steps.len()],
    }
}

fn elapsed_in(record: &TimingRecord, step: &StepDefinition, end: DateTime<Utc>) -> Duration {
    record
        .step_start(step.state)
        .map_or_else(Duration::zero, |start| (end - start).max(Duration::zero()))
}

fn fraction(elapsed: Duration, estimated: Duration) -> f64 {
    let estimated_ms = estimated.num_milliseconds();
    if estimated_ms <= 0 {
        return 1.0;
    }
    (elapsed.num_milliseconds() as f64 / estimated_ms as f64).clamp(0.0, 1.0)
}

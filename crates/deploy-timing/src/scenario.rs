//! Offline replay of a recorded sequence of polled snapshots.
//!
//! A scenario file lists snapshots with the second (relative to `start`) at
//! which each was observed. Replaying samples the progress view on a fixed
//! grid, which is how the CLI and the integration tests exercise the store and
//! estimator without a running clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TimingError};
use crate::estimator::{estimate, DeploymentProgress};
use crate::snapshot::DeploymentSnapshot;
use crate::state::DeploymentId;
use crate::steps::{StepDefinitions, StepEstimates, MAX_STEP_SECS};
use crate::store::TimingStore;

/// Largest accepted offset from `start`, either direction (100 years).
pub const MAX_OFFSET_SECS: i64 = 100 * 365 * 86_400;

/// Most frames a single replay may produce.
pub const MAX_FRAMES: i64 = 100_000;

/// A snapshot stamped with its observation offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedSnapshot {
    pub at_secs: i64,
    #[serde(flatten)]
    pub snapshot: DeploymentSnapshot,
}

/// A recorded deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Wall-clock time of offset zero; the Unix epoch if absent
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Step estimates overriding the configured ones
    #[serde(default)]
    pub steps: Option<StepEstimates>,
    pub snapshots: Vec<TimedSnapshot>,
}

/// Progress sampled at one offset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFrame {
    pub at_secs: i64,
    pub progress: DeploymentProgress,
}

impl Scenario {
    pub fn from_json(contents: &str) -> Result<Self> {
        let mut scenario: Self = serde_json::from_str(contents)?;
        let start = scenario.start();
        if let Some(bad) = scenario
            .snapshots
            .iter()
            .find(|s| {
                !(-MAX_OFFSET_SECS..=MAX_OFFSET_SECS).contains(&s.at_secs)
                    || at_offset(start, s.at_secs).is_none()
            })
        {
            return Err(TimingError::InvalidScenario(format!(
                "snapshot offset {}s is outside ±{MAX_OFFSET_SECS}s of the start",
                bad.at_secs
            )));
        }
        if let Some((key, value)) = scenario.steps.as_ref().and_then(StepEstimates::out_of_range) {
            return Err(TimingError::InvalidScenario(format!(
                "steps.{key} = {value} exceeds the maximum of {MAX_STEP_SECS} seconds"
            )));
        }
        scenario.snapshots.sort_by_key(|s| s.at_secs);
        Ok(scenario)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| TimingError::ScenarioRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// The deployment this scenario follows: the first snapshot carrying an id.
    #[must_use]
    pub fn deployment_id(&self) -> Option<DeploymentId> {
        self.snapshots.iter().find_map(|s| s.snapshot.id.clone())
    }

    /// Offset of the last recorded snapshot.
    #[must_use]
    pub fn last_offset(&self) -> i64 {
        self.snapshots.last().map_or(0, |s| s.at_secs)
    }

    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start.unwrap_or_default()
    }

    /// Step definitions for this scenario, falling back to `configured`.
    #[must_use]
    pub fn step_definitions(&self, configured: &StepDefinitions) -> StepDefinitions {
        self.steps
            .as_ref()
            .map_or_else(|| configured.clone(), StepDefinitions::from_estimates)
    }

    /// Sample progress every `every_secs` from offset zero through `until_secs`.
    ///
    /// Snapshots are observed at their own offsets before the frame that
    /// follows them is computed. Ranges beyond [`MAX_OFFSET_SECS`] or
    /// [`MAX_FRAMES`] are rejected.
    pub fn replay(
        &self,
        steps: &StepDefinitions,
        until_secs: i64,
        every_secs: i64,
    ) -> Result<Vec<ReplayFrame>> {
        let every = every_secs.max(1);
        if until_secs > MAX_OFFSET_SECS {
            return Err(TimingError::InvalidScenario(format!(
                "replay end {until_secs}s exceeds the maximum of {MAX_OFFSET_SECS}s"
            )));
        }
        if until_secs / every >= MAX_FRAMES {
            return Err(TimingError::InvalidScenario(format!(
                "sampling every {every}s through {until_secs}s exceeds {MAX_FRAMES} frames"
            )));
        }
        let Some(id) = self.deployment_id() else {
            return Ok(Vec::new());
        };

        let start = self.start();
        let store = TimingStore::new();
        let mut pending = self.snapshots.iter().peekable();
        let mut frames = Vec::new();

        let mut at = 0;
        while at <= until_secs {
            let Some(now) = at_offset(start, at) else {
                break;
            };
            while let Some(next) = pending.next_if(|s| s.at_secs <= at) {
                if let Some(observed) = at_offset(start, next.at_secs) {
                    store.observe(&next.snapshot, observed);
                }
            }
            frames.push(ReplayFrame {
                at_secs: at,
                progress: estimate(store.get(&id).as_ref(), steps, now),
            });
            let Some(next_at) = at.checked_add(every) else {
                break;
            };
            at = next_at;
        }

        Ok(frames)
    }
}

fn at_offset(start: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|offset| start.checked_add_signed(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::StepStatus;

    const SCENARIO: &str = r#"{
        "start": "2024-05-01T10:00:00Z",
        "snapshots": [
            {"atSecs": 40, "id": 9, "state": "IN_PROGRESS"},
            {"atSecs": 0, "id": 9, "state": "REQUESTED"},
            {"atSecs": 10, "id": 9, "state": "PENDING"},
            {"atSecs": 220, "id": 9, "state": "SUCCESS"}
        ]
    }"#;

    #[test]
    fn test_parse_sorts_snapshots() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        let offsets: Vec<_> = scenario.snapshots.iter().map(|s| s.at_secs).collect();
        assert_eq!(offsets, vec![0, 10, 40, 220]);
        assert_eq!(scenario.deployment_id(), Some(DeploymentId::from(9)));
        assert_eq!(scenario.last_offset(), 220);
    }

    #[test]
    fn test_replay_frames() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        let steps = StepDefinitions::default();
        let frames = scenario.replay(&steps, 240, 20).unwrap();

        assert_eq!(frames.len(), 13);
        assert_eq!(frames[0].progress.steps[0].status, StepStatus::Active);

        let mid = &frames[2];
        assert_eq!(mid.at_secs, 40);
        assert_eq!(mid.progress.steps[2].status, StepStatus::Active);

        let last = frames.last().unwrap();
        assert!(last
            .progress
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Completed));
        assert_eq!(last.progress.duration, Some(Duration::seconds(220)));
    }

    #[test]
    fn test_replay_without_ids_is_empty() {
        let scenario =
            Scenario::from_json(r#"{"snapshots": [{"atSecs": 0, "state": "PENDING"}]}"#).unwrap();
        assert!(scenario
            .replay(&StepDefinitions::default(), 60, 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_out_of_range_offsets_rejected() {
        let err = Scenario::from_json(
            r#"{"snapshots": [{"atSecs": 1000000000000000, "id": 1, "state": "PENDING"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TimingError::InvalidScenario(_)));

        let err = Scenario::from_json(
            r#"{"snapshots": [{"atSecs": -9223372036854775808, "id": 1}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TimingError::InvalidScenario(_)));

        let err = Scenario::from_json(
            r#"{"steps": {"pending_secs": 9000000000000000}, "snapshots": []}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("pending_secs"));
    }

    #[test]
    fn test_replay_range_is_bounded() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        let steps = StepDefinitions::default();

        assert!(matches!(
            scenario.replay(&steps, i64::MAX, 1),
            Err(TimingError::InvalidScenario(_))
        ));
        assert!(matches!(
            scenario.replay(&steps, MAX_OFFSET_SECS, 1),
            Err(TimingError::InvalidScenario(_))
        ));

        let frames = scenario
            .replay(&steps, MAX_OFFSET_SECS, MAX_OFFSET_SECS)
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[1]
            .progress
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Completed));
    }

    #[test]
    fn test_missing_scenario_file() {
        let err = Scenario::from_file("/nonexistent/scenario.json").unwrap_err();
        assert!(matches!(err, TimingError::ScenarioRead { .. }));
        assert!(err.to_string().starts_with("Failed to read scenario file"));
    }

    #[test]
    fn test_scenario_step_override() {
        let scenario =
            Scenario::from_json(r#"{"steps": {"in_progress_secs": 60}, "snapshots": []}"#).unwrap();
        let steps = scenario.step_definitions(&StepDefinitions::default());
        assert_eq!(steps.total_estimate(), Duration::seconds(100));
    }
}

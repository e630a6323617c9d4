//! Process-wide deployment id → timing record map.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::record::{TimingRecord, Transition};
use crate::snapshot::DeploymentSnapshot;
use crate::state::DeploymentId;

/// Shared timing store.
///
/// Cheap to clone; every clone points at the same map. Owned by the
/// application root and handed to views so in-flight timings survive a view
/// being unmounted and mounted again. Updates to one deployment are applied
/// under its shard lock, so concurrent pollers of the same deployment never
/// reset its timers.
#[derive(Debug, Clone, Default)]
pub struct TimingStore {
    records: Arc<DashMap<DeploymentId, TimingRecord>>,
}

impl TimingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a polled snapshot observed at `now`.
    ///
    /// Snapshots missing an id or a state are ignored.
    pub fn observe(&self, snapshot: &DeploymentSnapshot, now: DateTime<Utc>) -> Transition {
        let (Some(id), Some(state)) = (snapshot.id.as_ref(), snapshot.state) else {
            debug!("Ignoring deployment snapshot without id or state");
            return Transition::Ignored;
        };

        let transition = match self.records.entry(id.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().apply(state, now),
            Entry::Vacant(entry) => {
                debug!(deployment_id = %id, "Tracking new deployment");
                let mut record = TimingRecord::new();
                let transition = record.apply(state, now);
                entry.insert(record);
                transition
            }
        };

        match transition {
            Transition::Terminated { state } => {
                info!(deployment_id = %id, state = %state, "Deployment reached terminal state");
            }
            Transition::Advanced { from, to } => {
                debug!(deployment_id = %id, from = ?from, to = %to, "Deployment advanced");
            }
            Transition::InheritedStart => {
                debug!(deployment_id = %id, "PENDING inherited REQUESTED start time");
            }
            Transition::Unchanged | Transition::Ignored => {}
        }

        transition
    }

    /// Copy of the record for `id`, if tracked.
    #[must_use]
    pub fn get(&self, id: &DeploymentId) -> Option<TimingRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn contains(&self, id: &DeploymentId) -> bool {
        self.records.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keep only records for which `keep` returns true; returns how many were
    /// dropped.
    pub(crate) fn retain(
        &self,
        mut keep: impl FnMut(&DeploymentId, &TimingRecord) -> bool,
    ) -> usize {
        let mut removed = 0;
        self.records.retain(|id, record| {
            let kept = keep(id, record);
            if !kept {
                removed += 1;
            }
            kept
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DeploymentState;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_observe_creates_record_lazily() {
        let store = TimingStore::new();
        assert!(store.is_empty());

        store.observe(&DeploymentSnapshot::new("d-1", DeploymentState::Requested), t(0));
        let record = store.get(&"d-1".into()).unwrap();
        assert_eq!(record.last_known_state(), Some(DeploymentState::Requested));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_observe_ignores_incomplete_snapshots() {
        let store = TimingStore::new();
        let no_state = DeploymentSnapshot {
            id: Some("d-1".into()),
            ..DeploymentSnapshot::default()
        };
        let no_id = DeploymentSnapshot {
            state: Some(DeploymentState::Pending),
            ..DeploymentSnapshot::default()
        };

        assert_eq!(store.observe(&no_state, t(0)), Transition::Ignored);
        assert_eq!(store.observe(&no_id, t(0)), Transition::Ignored);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clones_share_records() {
        let store = TimingStore::new();
        let other = store.clone();
        other.observe(&DeploymentSnapshot::new(9, DeploymentState::InProgress), t(0));
        assert!(store.contains(&DeploymentId::from(9)));
    }

    #[test]
    fn test_concurrent_observers_keep_first_start() {
        let store = TimingStore::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.observe(
                        &DeploymentSnapshot::new("shared", DeploymentState::InProgress),
                        t(i),
                    )
                })
            })
            .collect();

        let advanced = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|tr| matches!(tr, Transition::Advanced { .. }))
            .count();

        assert_eq!(advanced, 1);
        let start = store
            .get(&"shared".into())
            .and_then(|r| r.step_start(DeploymentState::InProgress))
            .unwrap();
        assert!(start >= t(0) && start <= t(7));
    }
}

//! A mounted deployment pipeline view.
//!
//! The view recomputes progress on every clock tick and whenever a snapshot
//! arrives. Snapshots that arrived before a tick are applied before that
//! tick's values are computed. Unmounting cancels the view and any pollers
//! attached to it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::estimator::DeploymentProgress;
use crate::poller::{DeploymentPoller, DeploymentSource};
use crate::snapshot::DeploymentSnapshot;
use crate::state::DeploymentId;
use crate::tracker::Tracker;

/// What the rendering layer receives for a mounted deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPanel {
    pub id: DeploymentId,
    pub progress: DeploymentProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_run_url: Option<String>,
}

/// Handle to a mounted deployment view.
#[derive(Debug)]
pub struct DeploymentView {
    id: DeploymentId,
    panel: watch::Receiver<DeploymentPanel>,
    snapshots: mpsc::UnboundedSender<DeploymentSnapshot>,
    cancel: CancellationToken,
}

impl DeploymentView {
    /// Mount a view for `id` driven by `ticks`. Must be called inside a tokio
    /// runtime.
    ///
    /// Mounting runs the retention sweep.
    #[must_use]
    pub fn mount(
        tracker: Tracker,
        id: DeploymentId,
        mut ticks: watch::Receiver<DateTime<Utc>>,
    ) -> Self {
        tracker.sweep();

        let now = *ticks.borrow_and_update();
        let (panel_tx, panel) = watch::channel(DeploymentPanel {
            id: id.clone(),
            progress: tracker.progress(&id, now),
            workflow_run_url: None,
        });
        let (snapshots, mut snapshots_rx) = mpsc::unbounded_channel::<DeploymentSnapshot>();
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            debug!(deployment_id = %task_id, "Deployment view mounted");
            let mut workflow_run_url = None;

            loop {
                let now = tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    Some(snapshot) = snapshots_rx.recv() => {
                        apply(&tracker, &task_id, &snapshot, &mut workflow_run_url);
                        tracker.now()
                    }
                    changed = ticks.changed() => {
                        if changed.is_err() {
                            debug!(deployment_id = %task_id, "Clock stopped");
                            break;
                        }
                        // Snapshots queued before this tick land first.
                        while let Ok(snapshot) = snapshots_rx.try_recv() {
                            apply(&tracker, &task_id, &snapshot, &mut workflow_run_url);
                        }
                        *ticks.borrow_and_update()
                    }
                };

                panel_tx.send_replace(DeploymentPanel {
                    id: task_id.clone(),
                    progress: tracker.progress(&task_id, now),
                    workflow_run_url: workflow_run_url.clone(),
                });
            }

            debug!(deployment_id = %task_id, "Deployment view unmounted");
        });

        Self {
            id,
            panel,
            snapshots,
            cancel,
        }
    }

    #[must_use]
    pub fn id(&self) -> &DeploymentId {
        &self.id
    }

    /// Latest published panel.
    #[must_use]
    pub fn current(&self) -> DeploymentPanel {
        self.panel.borrow().clone()
    }

    /// Receiver for the rendering layer.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DeploymentPanel> {
        self.panel.clone()
    }

    /// Hand a freshly fetched snapshot to the view.
    ///
    /// Returns false once the view is unmounted.
    pub fn push(&self, snapshot: DeploymentSnapshot) -> bool {
        self.snapshots.send(snapshot).is_ok()
    }

    /// Poll `source` every `interval` while the deployment is active.
    ///
    /// The poller stops with the view.
    #[must_use]
    pub fn attach_poller(
        &self,
        source: Arc<dyn DeploymentSource>,
        interval: Duration,
    ) -> DeploymentPoller {
        DeploymentPoller::spawn(
            source,
            self.id.clone(),
            interval,
            self.snapshots.clone(),
            self.cancel.child_token(),
        )
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn unmount(&self) {
        if !self.cancel.is_cancelled() {
            info!(deployment_id = %self.id, "Unmounting deployment view");
        }
        self.cancel.cancel();
    }
}

impl Drop for DeploymentView {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn apply(
    tracker: &Tracker,
    id: &DeploymentId,
    snapshot: &DeploymentSnapshot,
    workflow_run_url: &mut Option<String>,
) {
    if snapshot.id.as_ref() != Some(id) {
        debug!(
            deployment = %id,
            snapshot_id = ?snapshot.id,
            "Ignoring snapshot for another deployment"
        );
        return;
    }
    tracker.observe(snapshot);
    if snapshot.workflow_run_url.is_some() {
        workflow_run_url.clone_from(&snapshot.workflow_run_url);
    }
}

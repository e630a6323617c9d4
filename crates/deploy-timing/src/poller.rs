//! Deployment polling, decoupled from the display clock.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TimingError;
use crate::snapshot::DeploymentSnapshot;
use crate::state::DeploymentId;

/// Where deployment snapshots come from (REST client, test fake, ...).
#[async_trait]
pub trait DeploymentSource: Send + Sync {
    async fn fetch(&self, id: &DeploymentId) -> Result<DeploymentSnapshot, TimingError>;
}

/// Background poller for one deployment.
///
/// Fetches immediately, then every `interval`, until the deployment reports a
/// terminal state, the receiving view goes away, or the poller is stopped.
/// Fetch failures are logged and the next poll proceeds as usual.
#[derive(Debug)]
pub struct DeploymentPoller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DeploymentPoller {
    #[must_use]
    pub fn spawn(
        source: Arc<dyn DeploymentSource>,
        id: DeploymentId,
        interval: Duration,
        sink: mpsc::UnboundedSender<DeploymentSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                deployment_id = %id,
                interval_ms = interval.as_millis() as u64,
                "Deployment polling started"
            );

            loop {
                tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    result = source.fetch(&id) => result,
                };

                match result {
                    Ok(snapshot) => {
                        let terminal = snapshot.is_terminal();
                        if sink.send(snapshot).is_err() {
                            debug!(deployment_id = %id, "View gone, stopping poller");
                            break;
                        }
                        if terminal {
                            info!(deployment_id = %id, "Deployment finished, polling stopped");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(deployment_id = %id, error = %e, "Deployment poll failed");
                    }
                }
            }

            debug!(deployment_id = %id, "Deployment poller exited");
        });

        Self { cancel, handle }
    }

    /// Whether the polling task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for DeploymentPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

//! Background status polling.
//!
//! Polling is Active while any local stream runs or the backend reports a
//! job in progress, and Suspended otherwise. A suspended poller issues no
//! requests until a local `start` wakes it.

use std::sync::Arc;

use core_async::task::JoinHandle;
use tracing::debug;

use crate::backend::RemoteStatus;
use crate::orchestrator::SyncOrchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingState {
    Active,
    Suspended,
}

impl PollingState {
    pub fn evaluate(local_running: bool, remote: &RemoteStatus) -> Self {
        if local_running || remote.any_in_progress() {
            PollingState::Active
        } else {
            PollingState::Suspended
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PollingState::Active)
    }
}

/// Handle to the polling task; polling stops when it is dropped
pub struct StatusPoller {
    task: JoinHandle<()>,
}

impl StatusPoller {
    /// Poll once immediately, then every poll interval while Active
    pub fn spawn(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            task: core_async::spawn(supervise(orchestrator)),
        }
    }

    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn supervise(orchestrator: Arc<SyncOrchestrator>) {
    let interval = orchestrator.poll_interval();

    loop {
        orchestrator.poll_once().await;

        // Registered before the state check so a start in between is not lost.
        let woken = orchestrator.wake().notified();
        if !orchestrator.polling_state().is_active() {
            debug!("Status polling suspended");
            woken.await;
            debug!("Status polling resumed");
        }

        core_async::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_state_evaluation() {
        let idle = RemoteStatus::new().with_source("chub", false);
        let busy = RemoteStatus::new().with_source("chub", true);

        assert_eq!(PollingState::evaluate(false, &idle), PollingState::Suspended);
        assert_eq!(PollingState::evaluate(true, &idle), PollingState::Active);
        assert_eq!(PollingState::evaluate(false, &busy), PollingState::Active);
        assert!(!PollingState::evaluate(false, &RemoteStatus::new()).is_active());
    }
}

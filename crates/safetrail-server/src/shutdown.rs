//! Server stop sequence.
//!
//! Every session token, sweep task and the HTTP listener derive from one
//! root token. Stopping cancels it, then waits under a single deadline for
//! the sweeps to exit and for each session loop to unregister itself.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::websocket::ConnectionRegistry;

/// Poll interval while waiting for sessions to unregister.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// What was still running when [`ShutdownCoordinator::stop`] returned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Background tasks that did not exit before the deadline.
    pub tasks_left: usize,
    /// Sessions still registered at the deadline.
    pub sessions_left: usize,
}

impl StopReport {
    /// Everything stopped in time.
    pub fn is_clean(&self) -> bool {
        self.tasks_left == 0 && self.sessions_left == 0
    }
}

/// Owns the root cancellation token.
#[derive(Default)]
pub struct ShutdownCoordinator {
    root: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator that has not started stopping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the root token. Session tokens are children of it.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopping(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel everything, then wait up to `timeout` in total for `tasks` to
    /// finish and for `registry` to empty.
    pub async fn stop(
        &self,
        tasks: Vec<JoinHandle<()>>,
        registry: &ConnectionRegistry,
        timeout: Duration,
    ) -> StopReport {
        self.root.cancel();
        let deadline = Instant::now() + timeout;
        info!(tasks = tasks.len(), sessions = registry.len(), ?timeout, "stopping");

        let tasks_left = join_tasks(tasks, deadline).await;
        let sessions_left = drain_sessions(registry, deadline).await;
        let report = StopReport {
            tasks_left,
            sessions_left,
        };
        if !report.is_clean() {
            warn!(tasks_left, sessions_left, "stop deadline passed");
        }
        report
    }
}

async fn join_tasks(tasks: Vec<JoinHandle<()>>, deadline: Instant) -> usize {
    let mut left = 0;
    for mut task in tasks {
        if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
            task.abort();
            left += 1;
        }
    }
    left
}

/// Wait for session loops to run their disconnect path. Returns how many
/// were still registered at `deadline`.
async fn drain_sessions(registry: &ConnectionRegistry, deadline: Instant) -> usize {
    while !registry.is_empty() && Instant::now() < deadline {
        tokio::time::sleep(DRAIN_POLL).await;
    }
    registry.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(coord: &ShutdownCoordinator) -> ConnectionRegistry {
        ConnectionRegistry::new(8, coord.token())
    }

    #[tokio::test]
    async fn stop_cancels_sessions_and_waits_for_unregister() {
        let coord = ShutdownCoordinator::new();
        let registry = std::sync::Arc::new(registry(&coord));
        let (session, _rx) = registry.register();

        // Stand-in for a session loop: unregister once cancelled.
        let loop_registry = std::sync::Arc::clone(&registry);
        let token = session.cancel_token();
        let id = session.id.clone();
        let session_loop = tokio::spawn(async move {
            token.cancelled().await;
            let _ = loop_registry.unregister(&id);
        });

        let report = coord.stop(vec![session_loop], &registry, Duration::from_secs(5)).await;
        assert!(coord.is_stopping());
        assert!(report.is_clean());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn one_deadline_covers_both_phases() {
        let coord = ShutdownCoordinator::new();
        let registry = registry(&coord);
        let (_stuck_session, _rx) = registry.register();
        let stuck_task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let started = Instant::now();
        let report = coord.stop(vec![stuck_task], &registry, Duration::from_secs(2)).await;
        assert_eq!(
            report,
            StopReport {
                tasks_left: 1,
                sessions_left: 1
            }
        );
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn session_tokens_follow_the_root() {
        let coord = ShutdownCoordinator::new();
        let registry = registry(&coord);
        let (session, _rx) = registry.register();
        assert!(!session.cancel_token().is_cancelled());
        coord.root.cancel();
        assert!(session.cancel_token().is_cancelled());
    }
}

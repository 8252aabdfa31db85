//! Periodic liveness and retention sweeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use safetrail_settings::HousekeepingSettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hub::Hub;
use crate::metrics::ALERTS_EXPIRED_TOTAL;
use crate::websocket::protocol::ServerFrame;

/// Runs the two background sweeps against a [`Hub`].
pub struct Housekeeper {
    hub: Arc<Hub>,
    liveness_interval: Duration,
    retention_interval: Duration,
}

impl Housekeeper {
    /// Sweeps over `hub` at the configured intervals.
    pub fn new(hub: Arc<Hub>, settings: &HousekeepingSettings) -> Self {
        Self {
            hub,
            liveness_interval: settings.liveness_interval(),
            retention_interval: settings.retention_interval(),
        }
    }

    /// Close dead or silent sessions, then broadcast `health_check`.
    /// Returns the number closed.
    ///
    /// Closing only cancels the session. Its socket loop stops reading and
    /// then runs [`Hub::disconnect`], so no frame is handled after cleanup.
    /// Works on a registry snapshot; no lock is held across the traversal.
    pub fn sweep_liveness(&self) -> usize {
        let timeout = self.hub.heartbeat_timeout();
        let mut pruned = 0;
        let mut open = 0;
        for session in self.hub.registry.snapshot() {
            let reason = if !session.is_open() {
                if session.cancel_token().is_cancelled() {
                    // Already shutting down.
                    continue;
                }
                "transport_closed"
            } else if session.idle_for() > timeout {
                "heartbeat_timeout"
            } else {
                open += 1;
                continue;
            };
            debug!(session_id = %session.id, reason, "closing session");
            session.close_because(reason);
            pruned += 1;
        }
        let sessions = open;
        let active = self.hub.alerts.active_count();
        let _ = self
            .hub
            .router
            .to_all(&ServerFrame::health_check(sessions, active), None);
        debug!(sessions, active, pruned, "liveness sweep");
        pruned
    }

    /// Delete alerts older than the retention window. Returns the number
    /// deleted.
    pub fn sweep_retention(&self, now: DateTime<Utc>) -> usize {
        let purged = self.hub.alerts.purge_expired(now, self.hub.retention());
        if purged > 0 {
            metrics::counter!(ALERTS_EXPIRED_TOTAL).increment(purged as u64);
            info!(purged, "expired alerts removed");
        }
        purged
    }

    /// Start both sweeps. They stop when `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let liveness = {
            let this = Arc::clone(&self);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(this.liveness_interval);
                let _ = interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let _ = this.sweep_liveness();
                        }
                        () = cancel.cancelled() => break,
                    }
                }
                debug!("liveness sweep stopped");
            })
        };
        let retention = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(self.retention_interval);
                let _ = interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let _ = self.sweep_retention(Utc::now());
                        }
                        () = cancel.cancelled() => break,
                    }
                }
                debug!("retention sweep stopped");
            })
        };
        vec![liveness, retention]
    }
}

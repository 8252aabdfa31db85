//! Turns alert store events into broadcasts.

use std::sync::Arc;

use safetrail_alerts::{AlertEvent, AlertListener};
use safetrail_core::Role;

use super::broadcast::BroadcastRouter;
use super::protocol::ServerFrame;
use crate::metrics::ALERTS_CREATED_TOTAL;

/// [`AlertListener`] that broadcasts every lifecycle change.
///
/// - created: `emergency_alert` to everyone, or to authorities only for
///   kinds that are not shared with tourists
/// - acknowledged: `emergency_acknowledged_by_authority` to the origin
///   session and `emergency_status_update` to authorities
/// - resolved: `emergency_status_update` to authorities
pub struct AlertFanout {
    router: Arc<BroadcastRouter>,
}

impl AlertFanout {
    /// Fan-out through `router`.
    pub fn new(router: Arc<BroadcastRouter>) -> Self {
        Self { router }
    }
}

impl AlertListener for AlertFanout {
    fn on_alert_event(&self, event: &AlertEvent) {
        match event {
            AlertEvent::Created(alert) => {
                metrics::counter!(ALERTS_CREATED_TOTAL, "kind" => alert.kind.as_str()).increment(1);
                let frame = ServerFrame::emergency_alert(alert.clone());
                if alert.kind.authority_only() {
                    let _ = self.router.to_role(Role::Authority, &frame);
                } else {
                    let _ = self.router.to_all(&frame, None);
                }
            }
            AlertEvent::Acknowledged(alert) => {
                let _ = self
                    .router
                    .to_session(&alert.session_id, &ServerFrame::acknowledged_by_authority(alert));
                let _ = self
                    .router
                    .to_role(Role::Authority, &ServerFrame::status_update(alert.clone()));
            }
            AlertEvent::Resolved(alert) => {
                let _ = self
                    .router
                    .to_role(Role::Authority, &ServerFrame::status_update(alert.clone()));
            }
        }
    }
}

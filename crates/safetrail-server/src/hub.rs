//! Shared context for connections, HTTP handlers and sweeps.

use std::sync::Arc;
use std::time::{Duration, Instant};

use safetrail_alerts::AlertStore;
use safetrail_core::{DisconnectPolicy, SessionId};
use safetrail_geofence::GeofenceEngine;
use safetrail_settings::SafetrailSettings;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::health::{self, HealthResponse};
use crate::metrics::{
    ALERTS_DROPPED_ON_DISCONNECT_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::websocket::fanout::AlertFanout;
use crate::websocket::protocol::ServerFrame;
use crate::websocket::{
    AcknowledgePolicy, BroadcastRouter, ConnectionRegistry, SelfDeclaredRole, SessionHandle,
};

/// Everything a session, handler or sweep needs. Cheap to share behind `Arc`.
pub struct Hub {
    /// Live sessions.
    pub registry: Arc<ConnectionRegistry>,
    /// Fan-out to sessions.
    pub router: Arc<BroadcastRouter>,
    /// Alert lifecycle; publishes through [`router`](Self::router).
    pub alerts: AlertStore,
    /// Zone evaluation.
    pub geofence: GeofenceEngine,
    acknowledge: Arc<dyn AcknowledgePolicy>,
    disconnect_policy: DisconnectPolicy,
    heartbeat_timeout: Duration,
    retention: chrono::Duration,
    started: Instant,
}

impl Hub {
    /// Hub wired from `settings`. Session tokens derive from `shutdown`.
    pub fn new(
        settings: &SafetrailSettings,
        geofence: GeofenceEngine,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(
            settings.server.send_queue,
            shutdown,
        ));
        let router = Arc::new(BroadcastRouter::new(Arc::clone(&registry)));
        let alerts =
            AlertStore::new().with_listener(Arc::new(AlertFanout::new(Arc::clone(&router))));
        let retention = chrono::Duration::from_std(settings.alerts.retention())
            .unwrap_or(chrono::Duration::MAX);
        Self {
            registry,
            router,
            alerts,
            geofence,
            acknowledge: Arc::new(SelfDeclaredRole),
            disconnect_policy: settings.alerts.disconnect_policy,
            heartbeat_timeout: settings.server.heartbeat_timeout(),
            retention,
            started: Instant::now(),
        }
    }

    /// Replace the acknowledge policy.
    #[must_use]
    pub fn with_acknowledge_policy(mut self, policy: Arc<dyn AcknowledgePolicy>) -> Self {
        self.acknowledge = policy;
        self
    }

    /// Who may acknowledge alerts.
    pub fn acknowledge_policy(&self) -> &dyn AcknowledgePolicy {
        self.acknowledge.as_ref()
    }

    /// Silence after which a session is pruned.
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Age after which alerts are purged.
    pub fn retention(&self) -> chrono::Duration {
        self.retention
    }

    /// Register a session, greet it, and announce it to everyone else.
    pub fn connect(&self) -> (Arc<SessionHandle>, mpsc::Receiver<Arc<String>>) {
        let (session, rx) = self
            .router
            .admit(|s| ServerFrame::connection_established(s.id.clone()));
        let count = self.registry.len();
        metrics::counter!(WS_CONNECTIONS_TOTAL).increment(1);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(WS_CONNECTIONS_ACTIVE).set(count as f64);
        info!(session_id = %session.id, connections = count, "session connected");

        let _ = self.router.to_all(
            &ServerFrame::user_connected(session.id.clone(), count),
            Some(&session.id),
        );
        (session, rx)
    }

    /// Remove a session and clean up after it. Safe to call from any path;
    /// only the first call for an ID does anything. Returns whether this call
    /// performed the cleanup.
    pub fn disconnect(&self, id: &SessionId, reason: &'static str) -> bool {
        let Some(_session) = self.registry.unregister(id) else {
            return false;
        };
        let dropped = self.alerts.remove_for_session(id, self.disconnect_policy);
        let count = self.registry.len();
        let _ = self
            .router
            .to_all(&ServerFrame::user_disconnected(id.clone(), count), None);

        metrics::counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason).increment(1);
        metrics::counter!(ALERTS_DROPPED_ON_DISCONNECT_TOTAL).increment(dropped.len() as u64);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(WS_CONNECTIONS_ACTIVE).set(count as f64);
        info!(session_id = %id, reason, connections = count, dropped_alerts = dropped.len(), "session disconnected");
        true
    }

    /// Current health counters.
    pub fn health(&self) -> HealthResponse {
        health::health_check(
            self.started,
            self.registry.len(),
            self.alerts.active_count(),
            self.geofence.snapshot().zones().len(),
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use safetrail_core::{Coordinates, Geofence};
    use safetrail_geofence::{GeofenceEngine, StaticZoneSource};
    use safetrail_settings::SafetrailSettings;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::Hub;

    /// Hub with one 1 km zone around (0, 0) named "Safe Zone 1".
    pub(crate) fn hub() -> Hub {
        hub_with(&SafetrailSettings::default())
    }

    pub(crate) fn hub_with(settings: &SafetrailSettings) -> Hub {
        let zones = vec![Geofence::circle(
            "Safe Zone 1",
            Coordinates { lat: 0.0, lng: 0.0 },
            1000.0,
        )];
        let engine = GeofenceEngine::new(
            Arc::new(StaticZoneSource::new(zones.clone())),
            settings.geofence.cache_ttl(),
        );
        let _ = engine.replace(zones);
        Hub::new(settings, engine, CancellationToken::new())
    }

    /// Parsed frames waiting in `rx`.
    pub(crate) fn frames(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    /// Types of the frames waiting in `rx`.
    pub(crate) fn types(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<String> {
        frames(rx)
            .iter()
            .map(|f| f["type"].as_str().unwrap().to_owned())
            .collect()
    }
}

//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket sessions opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions closed (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Deliveries dropped because a recipient queue was full or closed (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Inbound frames rejected as malformed (counter).
pub const WS_FRAMES_REJECTED_TOTAL: &str = "ws_frames_rejected_total";
/// Alerts created (counter, labels: kind).
pub const ALERTS_CREATED_TOTAL: &str = "alerts_created_total";
/// Alerts removed by the retention sweep (counter).
pub const ALERTS_EXPIRED_TOTAL: &str = "alerts_expired_total";
/// Alerts removed when their session disconnected (counter).
pub const ALERTS_DROPPED_ON_DISCONNECT_TOTAL: &str = "alerts_dropped_on_disconnect_total";

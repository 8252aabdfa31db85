//! Settings structures and compiled defaults.
//!
//! Every struct uses `#[serde(default)]` so a partial file only needs the
//! keys it changes. Field names are camelCase on disk.

use std::time::Duration;

use safetrail_core::{Coordinates, DisconnectPolicy, Geofence};
use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SafetrailSettings {
    /// HTTP and WebSocket listener.
    pub server: ServerSettings,
    /// Zone loading and caching.
    pub geofence: GeofenceSettings,
    /// Alert retention and cleanup.
    pub alerts: AlertSettings,
    /// Periodic sweeps.
    pub housekeeping: HousekeepingSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks a free port.
    pub port: u16,
    /// Upgrades beyond this many live sessions are refused.
    pub max_connections: usize,
    /// Per-session outbound queue depth.
    pub send_queue: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// WebSocket ping cadence.
    pub heartbeat_interval_secs: u64,
    /// Sessions silent for longer than this are pruned.
    pub heartbeat_timeout_secs: u64,
    /// Upper bound on the shutdown drain.
    pub shutdown_timeout_secs: u64,
    /// Include internal error details in 500 responses.
    pub expose_internal_errors: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
            max_connections: 10_000,
            send_queue: 256,
            max_message_size: 64 * 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            shutdown_timeout_secs: 10,
            expose_internal_errors: false,
        }
    }
}

impl ServerSettings {
    /// `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping cadence.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Idle limit.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Drain bound.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Zone settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeofenceSettings {
    /// Snapshot lifetime before a background reload.
    pub cache_ttl_secs: u64,
    /// JSON file of zones. When set, `zones` is ignored.
    pub zones_file: Option<String>,
    /// Inline zones.
    pub zones: Vec<Geofence>,
}

impl Default for GeofenceSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            zones_file: None,
            zones: vec![Geofence::circle(
                "Safe Zone 1",
                Coordinates {
                    lat: 28.6139,
                    lng: 77.2090,
                },
                1000.0,
            )],
        }
    }
}

impl GeofenceSettings {
    /// Snapshot lifetime.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Alert settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlertSettings {
    /// Alerts older than this are purged regardless of status.
    pub retention_hours: u64,
    /// Cleanup applied when an originating session disconnects.
    pub disconnect_policy: DisconnectPolicy,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            retention_hours: 24,
            disconnect_policy: DisconnectPolicy::default(),
        }
    }
}

impl AlertSettings {
    /// Retention window.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }
}

/// Sweep cadences.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HousekeepingSettings {
    /// Liveness sweep and `health_check` broadcast.
    pub liveness_interval_secs: u64,
    /// Retention sweep.
    pub retention_interval_secs: u64,
}

impl Default for HousekeepingSettings {
    fn default() -> Self {
        Self {
            liveness_interval_secs: 30,
            retention_interval_secs: 3600,
        }
    }
}

impl HousekeepingSettings {
    /// Liveness cadence.
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    /// Retention cadence.
    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_secs)
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// One JSON object per line.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

//! Emergency alert records.
//!
//! Lifecycle transitions are owned by `safetrail-alerts`; this module holds
//! the record itself plus the defaults applied when one is created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AlertId, SessionId};
use crate::location::Location;

/// What raised the alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Panic frame from a connected session.
    Panic,
    /// Configured geofence crossing.
    Geofence,
    /// Anomaly reported by the ML pipeline.
    MlAnomaly,
    /// Panic submitted over HTTP.
    HttpSubmitted,
}

impl AlertKind {
    /// Wire name, also used as a metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Panic => "panic",
            Self::Geofence => "geofence",
            Self::MlAnomaly => "ml_anomaly",
            Self::HttpSubmitted => "http_submitted",
        }
    }

    /// Alerts raised outside a live session go to authorities only.
    pub fn authority_only(self) -> bool {
        matches!(self, Self::MlAnomaly | Self::HttpSubmitted)
    }
}

/// Lifecycle state. `Resolved` is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Raised, nobody has responded yet.
    #[default]
    Active,
    /// An authority has responded.
    Acknowledged,
    /// Closed.
    Resolved,
}

impl AlertStatus {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }
}

/// Free-form details attached by the raiser.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    /// Category, e.g. `general`, `medical`, `geofence_exit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_type: Option<String>,
    /// Human readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Severity label, e.g. `HIGH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Channel the alert arrived on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl AlertPayload {
    /// Fill every unset field with the default for `kind`.
    #[must_use]
    pub fn with_defaults(mut self, kind: AlertKind) -> Self {
        let (emergency_type, message, source) = match kind {
            AlertKind::Panic => ("general", "Need immediate help!", "websocket"),
            AlertKind::Geofence => ("geofence", "Geofence boundary crossed", "geofence"),
            AlertKind::MlAnomaly => ("ANOMALY_DETECTED", "Anomaly detected", "ML_MODEL"),
            AlertKind::HttpSubmitted => ("general", "Need immediate help!", "http_api"),
        };
        let _ = self
            .emergency_type
            .get_or_insert_with(|| emergency_type.to_owned());
        let _ = self.message.get_or_insert_with(|| message.to_owned());
        let _ = self.severity.get_or_insert_with(|| "HIGH".to_owned());
        let _ = self.source.get_or_insert_with(|| source.to_owned());
        self
    }
}

/// A tracked emergency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Time-ordered identifier.
    pub id: AlertId,
    /// Session (or external user id) that raised it.
    pub session_id: SessionId,
    /// Origin.
    pub kind: AlertKind,
    /// Where it happened, if known.
    pub location: Option<Location>,
    /// Zone whose crossing produced a geofence alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Raiser-supplied details.
    pub payload: AlertPayload,
    /// Lifecycle state.
    pub status: AlertStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Actor that acknowledged.
    pub acknowledged_by: Option<String>,
    /// Time of acknowledgement.
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// Actor that resolved.
    pub resolved_by: Option<String>,
    /// Time of resolution.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Still waiting for a response.
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

/// Input to alert creation.
#[derive(Clone, Debug, PartialEq)]
pub struct NewAlert {
    /// Origin.
    pub kind: AlertKind,
    /// Raising session.
    pub session_id: SessionId,
    /// Where it happened, if known.
    pub location: Option<Location>,
    /// Zone name for geofence alerts.
    pub zone: Option<String>,
    /// Details. Missing fields get per-kind defaults.
    pub payload: AlertPayload,
}

impl NewAlert {
    /// A new alert of `kind` with an empty payload.
    pub fn new(kind: AlertKind, session_id: SessionId) -> Self {
        Self {
            kind,
            session_id,
            location: None,
            zone: None,
            payload: AlertPayload::default(),
        }
    }

    /// Attach a location.
    #[must_use]
    pub fn at(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    /// Attach the zone that produced the alert.
    #[must_use]
    pub fn in_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: AlertPayload) -> Self {
        self.payload = payload;
        self
    }
}

/// What happens to a session's alerts when that session disconnects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Keep everything until the retention sweep.
    Retain,
    /// Delete alerts nobody has acknowledged yet.
    #[default]
    DropUnacknowledged,
    /// Delete every alert the session raised.
    DropAll,
}

impl DisconnectPolicy {
    /// Whether `alert` is deleted under this policy.
    pub fn drops(self, alert: &Alert) -> bool {
        match self {
            Self::Retain => false,
            Self::DropUnacknowledged => alert.is_active(),
            Self::DropAll => true,
        }
    }
}

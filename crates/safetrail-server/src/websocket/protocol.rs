//! JSON text frames exchanged over `/ws`.
//!
//! Every frame is an object tagged by `type`. Inbound frames are decoded
//! once into [`ClientFrame`]; a type this server does not know becomes
//! [`ClientFrame::Unknown`] instead of an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use safetrail_core::{Alert, AlertId, Location, LocationReport, Role, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const CLIENT_FRAME_TYPES: &[&str] = &[
    "location_update",
    "ping",
    "panic_alert",
    "identify_user",
    "emergency_acknowledged",
];

/// Reply text for a panic frame.
pub const PANIC_ACK_MESSAGE: &str = "Emergency services have been notified. Help is on the way!";
/// Text sent to the raiser when an authority acknowledges.
pub const AUTHORITY_ACK_MESSAGE: &str =
    "Authorities have acknowledged your emergency and are on the way!";

/// An inbound frame could not be decoded.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Not JSON at all.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// JSON without a string `type`.
    #[error("frame has no string `type` field")]
    MissingType,
    /// Known type with the wrong payload shape.
    #[error("invalid {frame_type} frame: {source}")]
    Malformed {
        /// The frame's `type`.
        frame_type: String,
        /// Decode failure.
        source: serde_json::Error,
    },
}

/// Optional details on a panic frame.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanicDetails {
    /// Category, e.g. `medical`.
    #[serde(default)]
    pub emergency_type: Option<String>,
    /// Free text.
    #[serde(default)]
    pub message: Option<String>,
}

/// Client → server frames.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// New position report.
    LocationUpdate {
        /// The position.
        #[serde(alias = "location")]
        data: LocationReport,
    },
    /// Application-level keepalive.
    Ping {},
    /// Raise a panic alert.
    PanicAlert {
        /// Where; falls back to the last known location.
        #[serde(default)]
        location: Option<LocationReport>,
        /// Extra details.
        #[serde(default)]
        data: Option<PanicDetails>,
    },
    /// Declare the session's role.
    IdentifyUser {
        /// New role.
        #[serde(rename = "userType")]
        user_type: Role,
    },
    /// Acknowledge an alert (authorities only).
    EmergencyAcknowledged {
        /// Target alert.
        #[serde(rename = "alertId")]
        alert_id: AlertId,
    },
    /// A `type` this server does not handle.
    #[serde(skip)]
    Unknown {
        /// The unrecognised type.
        frame_type: String,
    },
}

impl ClientFrame {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let frame_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?
            .to_owned();
        if !CLIENT_FRAME_TYPES.contains(&frame_type.as_str()) {
            return Ok(Self::Unknown { frame_type });
        }
        Self::deserialize(value).map_err(|source| FrameError::Malformed { frame_type, source })
    }
}

/// Server → client frames.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame on every connection.
    #[serde(rename_all = "camelCase")]
    ConnectionEstablished {
        /// The new session's ID.
        session_id: SessionId,
        /// Greeting.
        message: &'static str,
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// Another session moved.
    #[serde(rename_all = "camelCase")]
    LocationUpdate {
        /// Who moved.
        session_id: SessionId,
        /// Where to.
        data: Location,
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// Reply to `ping`.
    Pong {
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// Reply to `panic_alert`.
    #[serde(rename_all = "camelCase")]
    PanicAcknowledged {
        /// The created alert.
        alert_id: AlertId,
        /// Reassurance text.
        message: &'static str,
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// A new (or, for a newly identified authority, outstanding) alert.
    EmergencyAlert {
        /// Full record.
        alert: Alert,
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// Sent to the raiser when an authority acknowledges.
    #[serde(rename_all = "camelCase")]
    EmergencyAcknowledgedByAuthority {
        /// The alert.
        alert_id: AlertId,
        /// Acknowledging actor.
        acknowledged_by: String,
        /// Reassurance text.
        message: &'static str,
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// Alert status change, for authorities.
    EmergencyStatusUpdate {
        /// Full record after the change.
        alert: Alert,
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// A session joined.
    #[serde(rename_all = "camelCase")]
    UserConnected {
        /// Who joined.
        session_id: SessionId,
        /// Live sessions including the new one.
        user_count: usize,
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// A session left.
    #[serde(rename_all = "camelCase")]
    UserDisconnected {
        /// Who left.
        session_id: SessionId,
        /// Live sessions remaining.
        user_count: usize,
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// Periodic liveness summary.
    #[serde(rename_all = "camelCase")]
    HealthCheck {
        /// Live sessions.
        user_count: usize,
        /// Alerts still `active`.
        active_emergencies: usize,
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// The last inbound frame was rejected.
    Error {
        /// Reason.
        message: String,
    },
}

impl ServerFrame {
    /// `connection_established` for `session_id`.
    pub fn connection_established(session_id: SessionId) -> Self {
        Self::ConnectionEstablished {
            session_id,
            message: "WebSocket connected successfully",
            timestamp: Utc::now(),
        }
    }

    /// `location_update` relayed from `session_id`.
    pub fn location_update(session_id: SessionId, data: Location) -> Self {
        Self::LocationUpdate {
            session_id,
            data,
            timestamp: Utc::now(),
        }
    }

    /// `pong`.
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: Utc::now(),
        }
    }

    /// `panic_acknowledged` for `alert_id`.
    pub fn panic_acknowledged(alert_id: AlertId) -> Self {
        Self::PanicAcknowledged {
            alert_id,
            message: PANIC_ACK_MESSAGE,
            timestamp: Utc::now(),
        }
    }

    /// `emergency_alert` carrying `alert`.
    pub fn emergency_alert(alert: Alert) -> Self {
        Self::EmergencyAlert {
            alert,
            timestamp: Utc::now(),
        }
    }

    /// `emergency_acknowledged_by_authority` for an acknowledged alert.
    pub fn acknowledged_by_authority(alert: &Alert) -> Self {
        Self::EmergencyAcknowledgedByAuthority {
            alert_id: alert.id.clone(),
            acknowledged_by: alert
                .acknowledged_by
                .clone()
                .unwrap_or_else(|| Role::Authority.as_str().to_owned()),
            message: AUTHORITY_ACK_MESSAGE,
            timestamp: Utc::now(),
        }
    }

    /// `emergency_status_update` carrying `alert`.
    pub fn status_update(alert: Alert) -> Self {
        Self::EmergencyStatusUpdate {
            alert,
            timestamp: Utc::now(),
        }
    }

    /// `user_connected`.
    pub fn user_connected(session_id: SessionId, user_count: usize) -> Self {
        Self::UserConnected {
            session_id,
            user_count,
            timestamp: Utc::now(),
        }
    }

    /// `user_disconnected`.
    pub fn user_disconnected(session_id: SessionId, user_count: usize) -> Self {
        Self::UserDisconnected {
            session_id,
            user_count,
            timestamp: Utc::now(),
        }
    }

    /// `health_check`.
    pub fn health_check(user_count: usize, active_emergencies: usize) -> Self {
        Self::HealthCheck {
            user_count,
            active_emergencies,
            timestamp: Utc::now(),
        }
    }

    /// `error` with `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire `type`, for logs.
    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::LocationUpdate { .. } => "location_update",
            Self::Pong { .. } => "pong",
            Self::PanicAcknowledged { .. } => "panic_acknowledged",
            Self::EmergencyAlert { .. } => "emergency_alert",
            Self::EmergencyAcknowledgedByAuthority { .. } => "emergency_acknowledged_by_authority",
            Self::EmergencyStatusUpdate { .. } => "emergency_status_update",
            Self::UserConnected { .. } => "user_connected",
            Self::UserDisconnected { .. } => "user_disconnected",
            Self::HealthCheck { .. } => "health_check",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize once for fan-out.
    pub fn encode(&self) -> Result<Arc<String>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_location_update() {
        let frame =
            ClientFrame::decode(r#"{"type":"location_update","data":{"lat":28.6,"lng":77.2}}"#)
                .unwrap();
        let ClientFrame::LocationUpdate { data } = frame else {
            panic!("wrong variant");
        };
        assert!((data.lat - 28.6).abs() < f64::EPSILON);
        assert_eq!(data.accuracy, None);
    }

    #[test]
    fn decodes_ping_with_extra_fields() {
        let frame = ClientFrame::decode(r#"{"type":"ping","timestamp":123}"#).unwrap();
        assert_eq!(frame, ClientFrame::Ping {});
    }

    #[test]
    fn decodes_panic_without_location() {
        let frame = ClientFrame::decode(r#"{"type":"panic_alert"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::PanicAlert {
                location: None,
                data: None
            }
        );
        let frame = ClientFrame::decode(
            r#"{"type":"panic_alert","location":{"latitude":1,"longitude":2},"data":{"emergencyType":"medical"}}"#,
        )
        .unwrap();
        let ClientFrame::PanicAlert { location, data } = frame else {
            panic!("wrong variant");
        };
        assert!(location.is_some());
        assert_eq!(data.unwrap().emergency_type.as_deref(), Some("medical"));
    }

    #[test]
    fn decodes_identify_with_police_alias() {
        let frame = ClientFrame::decode(r#"{"type":"identify_user","userType":"police"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::IdentifyUser {
                user_type: Role::Authority
            }
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let frame = ClientFrame::decode(r#"{"type":"telepathy","x":1}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Unknown {
                frame_type: "telepathy".into()
            }
        );
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            ClientFrame::decode("not json"),
            Err(FrameError::Json(_))
        ));
        assert!(matches!(
            ClientFrame::decode(r#"{"data":1}"#),
            Err(FrameError::MissingType)
        ));
        assert!(matches!(
            ClientFrame::decode(r#"{"type":"location_update","data":{"lat":"north"}}"#),
            Err(FrameError::Malformed { .. })
        ));
        assert!(matches!(
            ClientFrame::decode(r#"{"type":"identify_user","userType":"mayor"}"#),
            Err(FrameError::Malformed { .. })
        ));
    }

    #[test]
    fn server_frames_are_tagged_camel_case() {
        let id = SessionId::from_raw("sess_1");
        let value: Value =
            serde_json::from_str(&ServerFrame::user_connected(id, 3).encode().unwrap()).unwrap();
        assert_eq!(value["type"], "user_connected");
        assert_eq!(value["sessionId"], "sess_1");
        assert_eq!(value["userCount"], 3);
        assert!(value["timestamp"].is_string());

        let value = serde_json::to_value(ServerFrame::error("bad")).unwrap();
        assert_eq!(value, json!({"type": "error", "message": "bad"}));
    }

    #[test]
    fn frame_type_matches_tag() {
        let frames = [
            ServerFrame::pong(),
            ServerFrame::health_check(1, 0),
            ServerFrame::panic_acknowledged(AlertId::from_raw("alert_1")),
            ServerFrame::connection_established(SessionId::new()),
        ];
        for frame in frames {
            let value = serde_json::to_value(&frame).unwrap();
            assert_eq!(value["type"], frame.frame_type());
        }
    }
}

//! `/emergencies` endpoints.

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use safetrail_core::{Alert, AlertId, AlertKind, AlertPayload, LocationReport, NewAlert, SessionId};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ApiError;
use crate::server::AppState;

/// Actor recorded when a request names none.
const DEFAULT_ACTOR: &str = "authority";

/// `GET /emergencies` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyList {
    /// Alerts still `active`.
    pub active_emergencies: usize,
    /// All stored alerts.
    pub total_emergencies: usize,
    /// Every stored alert, oldest first.
    pub emergencies: Vec<Alert>,
}

/// Response to alert creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Created {
    /// Always `true`.
    pub success: bool,
    /// New alert ID.
    pub alert_id: AlertId,
    /// Human readable outcome.
    pub message: &'static str,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// Response to a lifecycle change.
#[derive(Debug, Serialize)]
pub struct Transitioned {
    /// Always `true`.
    pub success: bool,
    /// Human readable outcome.
    pub message: &'static str,
    /// Record after the change.
    pub alert: Alert,
}

/// `POST /emergencies/panic-alert` body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanicRequest {
    /// Reporting user; a fresh session ID when absent.
    pub user_id: Option<String>,
    /// Where. Required.
    pub location: Option<LocationReport>,
    /// Category.
    pub emergency_type: Option<String>,
    /// Free text.
    pub message: Option<String>,
}

/// `POST /emergencies/ml-alert` body.
#[derive(Debug, Default, Deserialize)]
pub struct MlAlertRequest {
    /// Tourist the anomaly concerns. Required.
    pub tourist_id: Option<String>,
    /// Description. Required.
    pub message: Option<String>,
    /// Where, if known.
    pub location: Option<LocationReport>,
    /// Severity label.
    pub severity: Option<String>,
    /// Anomaly category.
    #[serde(rename = "type")]
    pub anomaly_type: Option<String>,
}

/// Body of acknowledge and resolve. Optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRequest {
    /// Who is acting.
    #[serde(alias = "acknowledgedBy", alias = "resolvedBy")]
    pub actor: Option<String>,
}

/// `GET /emergencies`
pub async fn list(State(state): State<AppState>) -> Json<EmergencyList> {
    let emergencies = state.hub.alerts.list_all();
    Json(EmergencyList {
        active_emergencies: emergencies.iter().filter(|a| a.is_active()).count(),
        total_emergencies: emergencies.len(),
        emergencies,
    })
}

/// `GET /emergencies/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, ApiError> {
    Ok(Json(state.hub.alerts.get(&AlertId::from_raw(id))?))
}

/// `POST /emergencies/panic-alert`
pub async fn panic_alert(
    State(state): State<AppState>,
    body: Result<Json<PanicRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Created>), ApiError> {
    let Json(req) = body?;
    let report = req
        .location
        .ok_or_else(|| ApiError::validation("Location is required"))?;
    let location = report.stamp(Utc::now()).map_err(|e| ApiError::Validation {
        message: "Invalid location".into(),
        details: Some(e.to_string()),
    })?;

    let session_id = req.user_id.map_or_else(SessionId::new, SessionId::from_raw);
    let alert = state.hub.alerts.create(
        NewAlert::new(AlertKind::HttpSubmitted, session_id)
            .at(Some(location))
            .with_payload(AlertPayload {
                emergency_type: req.emergency_type,
                message: req.message,
                ..AlertPayload::default()
            }),
    );
    info!(alert_id = %alert.id, session_id = %alert.session_id, "panic alert submitted over http");
    Ok((
        StatusCode::CREATED,
        Json(Created {
            success: true,
            alert_id: alert.id,
            message: "Emergency alert created and sent to authorities",
            timestamp: alert.created_at,
        }),
    ))
}

/// `POST /emergencies/ml-alert`
pub async fn ml_alert(
    State(state): State<AppState>,
    body: Result<Json<MlAlertRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Created>), ApiError> {
    let Json(req) = body?;
    let (Some(tourist_id), Some(message)) = (
        req.tourist_id.filter(|s| !s.is_empty()),
        req.message.filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::validation("Tourist ID and message are required"));
    };
    let location = req
        .location
        .map(|report| report.stamp(Utc::now()))
        .transpose()
        .map_err(|e| ApiError::Validation {
            message: "Invalid location".into(),
            details: Some(e.to_string()),
        })?;

    let alert = state.hub.alerts.create(
        NewAlert::new(AlertKind::MlAnomaly, SessionId::from_raw(tourist_id))
            .at(location)
            .with_payload(AlertPayload {
                emergency_type: req.anomaly_type,
                message: Some(message),
                severity: req.severity,
                source: None,
            }),
    );
    info!(alert_id = %alert.id, session_id = %alert.session_id, "anomaly alert received");
    Ok((
        StatusCode::CREATED,
        Json(Created {
            success: true,
            alert_id: alert.id,
            message: "ML alert processed and emergency services notified",
            timestamp: alert.created_at,
        }),
    ))
}

/// `POST /emergencies/{id}/acknowledge`
pub async fn acknowledge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Transitioned>, ApiError> {
    let actor = parse_actor(&body)?;
    let alert = state.hub.alerts.acknowledge(&AlertId::from_raw(id), &actor)?;
    Ok(Json(Transitioned {
        success: true,
        message: "Emergency acknowledged",
        alert,
    }))
}

/// `POST /emergencies/{id}/resolve`
pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Transitioned>, ApiError> {
    let actor = parse_actor(&body)?;
    let alert = state.hub.alerts.resolve(&AlertId::from_raw(id), &actor)?;
    Ok(Json(Transitioned {
        success: true,
        message: "Emergency resolved",
        alert,
    }))
}

/// Actor from an optional JSON body.
fn parse_actor(body: &[u8]) -> Result<String, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(DEFAULT_ACTOR.to_owned());
    }
    let req: ActorRequest = serde_json::from_slice(body).map_err(|e| ApiError::Validation {
        message: "Invalid request body".into(),
        details: Some(e.to_string()),
    })?;
    Ok(req
        .actor
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_ACTOR.to_owned()))
}

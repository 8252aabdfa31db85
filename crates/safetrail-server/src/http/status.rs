//! Session status, health and metrics endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::health::HealthResponse;
use crate::server::AppState;
use crate::websocket::SessionInfo;

/// `GET /websocket/status` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsocketStatus {
    /// Always `true`.
    pub websocket_enabled: bool,
    /// Live sessions.
    pub active_connections: usize,
    /// Alerts still `active`.
    pub active_emergencies: usize,
    /// One entry per live session, in connect order.
    pub clients: Vec<SessionInfo>,
}

/// `GET /websocket/status`
pub async fn websocket_status(State(state): State<AppState>) -> Json<WebsocketStatus> {
    let clients = state.hub.registry.sessions();
    Json(WebsocketStatus {
        websocket_enabled: true,
        active_connections: clients.len(),
        active_emergencies: state.hub.alerts.active_count(),
        clients,
    })
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.hub.health())
}

/// `GET /metrics`: Prometheus text, or 404 when no recorder is installed.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

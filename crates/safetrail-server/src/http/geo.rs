//! `/geo` endpoints.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use safetrail_core::{Coordinates, Geofence};
use safetrail_geofence::ZoneDistance;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::server::AppState;

const DEFAULT_NEAREST_LIMIT: usize = 5;
const MAX_NEAREST_LIMIT: usize = 50;

/// Query for point lookups. Values stay strings so missing and malformed
/// input get distinct errors.
#[derive(Debug, Default, Deserialize)]
pub struct PointQuery {
    /// Latitude.
    pub lat: Option<String>,
    /// Longitude.
    pub lng: Option<String>,
    /// Result cap for `/geo/nearest`.
    pub limit: Option<usize>,
}

impl PointQuery {
    fn coordinates(&self) -> Result<Coordinates, ApiError> {
        let (Some(lat), Some(lng)) = (self.lat.as_deref(), self.lng.as_deref()) else {
            return Err(ApiError::validation("Latitude and longitude are required"));
        };
        let invalid = || ApiError::validation("Invalid latitude or longitude");
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
        Coordinates::new(lat, lng).map_err(|e| ApiError::Validation {
            message: "Invalid latitude or longitude".into(),
            details: Some(e.to_string()),
        })
    }
}

/// `GET /geo/check` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    /// Queried latitude.
    pub latitude: f64,
    /// Queried longitude.
    pub longitude: f64,
    /// Whether any zone contains the point.
    pub in_geofence: bool,
    /// Containing zone name.
    pub boundary: Option<String>,
    /// Human readable outcome.
    pub message: String,
}

/// `GET /geo/boundaries` body.
#[derive(Debug, Serialize)]
pub struct BoundariesResponse {
    /// Zones in evaluation order.
    pub boundaries: Vec<Geofence>,
}

/// `GET /geo/nearest` body.
#[derive(Debug, Serialize)]
pub struct NearestResponse {
    /// Closest zones first.
    pub zones: Vec<ZoneDistance>,
}

/// `GET /geo/check?lat&lng`
pub async fn check(
    State(state): State<AppState>,
    query: Result<Query<PointQuery>, QueryRejection>,
) -> Result<Json<CheckResponse>, ApiError> {
    let Query(query) = query?;
    let point = query.coordinates()?;
    let evaluation = state.hub.geofence.evaluate(point);
    let boundary = evaluation.boundary().map(str::to_owned);
    let message = match &boundary {
        Some(name) => format!("You are within {name}"),
        None => "You are outside safe zones".to_owned(),
    };
    Ok(Json(CheckResponse {
        latitude: point.lat,
        longitude: point.lng,
        in_geofence: evaluation.inside,
        boundary,
        message,
    }))
}

/// `GET /geo/boundaries`
pub async fn boundaries(State(state): State<AppState>) -> Json<BoundariesResponse> {
    Json(BoundariesResponse {
        boundaries: state.hub.geofence.zones(),
    })
}

/// `GET /geo/nearest?lat&lng&limit`
pub async fn nearest(
    State(state): State<AppState>,
    query: Result<Query<PointQuery>, QueryRejection>,
) -> Result<Json<NearestResponse>, ApiError> {
    let Query(query) = query?;
    let point = query.coordinates()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_NEAREST_LIMIT)
        .min(MAX_NEAREST_LIMIT);
    Ok(Json(NearestResponse {
        zones: state.hub.geofence.nearest(point, limit),
    }))
}

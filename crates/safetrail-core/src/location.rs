//! Geographic coordinates and reported positions.
//!
//! Clients may send either `lat`/`lng` or `latitude`/`longitude`; both are
//! accepted on input and `lat`/`lng` is emitted on output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// A WGS-84 point in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in `[-90, 90]`.
    #[serde(alias = "latitude")]
    pub lat: f64,
    /// Longitude in `[-180, 180]`.
    #[serde(alias = "longitude")]
    pub lng: f64,
}

impl Coordinates {
    /// Build a validated point.
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        let point = Self { lat, lng };
        point.validate()?;
        Ok(point)
    }

    /// Check both axes are finite and in range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(ValidationError::Latitude(self.lat));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(ValidationError::Longitude(self.lng));
        }
        Ok(())
    }
}

/// A position as reported by a client, before the server stamps it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    /// Latitude in decimal degrees.
    #[serde(alias = "latitude")]
    pub lat: f64,
    /// Longitude in decimal degrees.
    #[serde(alias = "longitude")]
    pub lng: f64,
    /// Reported accuracy radius in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl LocationReport {
    /// The reported point, unvalidated.
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lng: self.lng,
        }
    }

    /// Validate and stamp with the server receive time.
    pub fn stamp(self, at: DateTime<Utc>) -> Result<Location, ValidationError> {
        self.coordinates().validate()?;
        Ok(Location {
            lat: self.lat,
            lng: self.lng,
            accuracy: self.accuracy,
            timestamp: at,
        })
    }
}

/// A validated, server-stamped position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Reported accuracy radius in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// When the server accepted the report.
    pub timestamp: DateTime<Utc>,
}

impl Location {
    /// The point part of this location.
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_boundary_values() {
        assert!(Coordinates::new(90.0, 180.0).is_ok());
        assert!(Coordinates::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        assert_eq!(
            Coordinates::new(90.5, 0.0),
            Err(ValidationError::Latitude(90.5))
        );
        assert_eq!(
            Coordinates::new(0.0, -181.0),
            Err(ValidationError::Longitude(-181.0))
        );
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
        assert!(Coordinates::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn report_accepts_long_field_names() {
        let report: LocationReport =
            serde_json::from_value(json!({"latitude": 28.6, "longitude": 77.2, "accuracy": 5.0}))
                .unwrap();
        assert_eq!(report.coordinates(), Coordinates { lat: 28.6, lng: 77.2 });
        assert_eq!(report.accuracy, Some(5.0));
    }

    #[test]
    fn report_ignores_client_timestamp() {
        let report: LocationReport =
            serde_json::from_value(json!({"lat": 1.0, "lng": 2.0, "timestamp": 1_700_000_000_000_u64}))
                .unwrap();
        assert_eq!(report.accuracy, None);
    }

    #[test]
    fn stamp_rejects_invalid_report() {
        let report = LocationReport {
            lat: 120.0,
            lng: 0.0,
            accuracy: None,
        };
        assert!(report.stamp(Utc::now()).is_err());
    }

    #[test]
    fn location_serializes_short_names() {
        let at = Utc::now();
        let loc = LocationReport {
            lat: 10.0,
            lng: 20.0,
            accuracy: None,
        }
        .stamp(at)
        .unwrap();
        let value = serde_json::to_value(loc).unwrap();
        assert_eq!(value["lat"], 10.0);
        assert_eq!(value["lng"], 20.0);
        assert!(value.get("accuracy").is_none());
    }
}

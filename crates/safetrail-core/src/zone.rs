//! Geofence definitions.
//!
//! Zones are plain data here. Containment and distance live in
//! `safetrail-geofence`; this module only describes a zone and checks it is
//! well formed before it is admitted into an engine snapshot.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::errors::ZoneError;
use crate::location::Coordinates;

/// Which boundary crossing of a zone raises an alert.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneTrigger {
    /// Leaving the zone raises an alert (safe zones).
    #[default]
    Exit,
    /// Entering the zone raises an alert (restricted zones).
    Enter,
    /// Crossings are tracked but never alert.
    Never,
}

/// Zone geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    /// Center plus radius in meters. The boundary is inside.
    Circle {
        /// Circle center.
        center: Coordinates,
        /// Radius in meters, strictly positive.
        radius: f64,
    },
    /// Implicitly closed ring of vertices, either winding.
    Polygon {
        /// Ring vertices.
        coordinates: Vec<Coordinates>,
    },
}

/// A named monitored region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    /// Unique display name.
    pub name: String,
    /// Higher priority zones win when regions overlap.
    #[serde(default)]
    pub priority: i32,
    /// Geometry.
    #[serde(flatten)]
    pub shape: Shape,
    /// Crossing that raises an alert.
    #[serde(default)]
    pub alert_on: ZoneTrigger,
}

impl Geofence {
    /// Circle zone with default priority and exit trigger.
    pub fn circle(name: impl Into<String>, center: Coordinates, radius: f64) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            shape: Shape::Circle { center, radius },
            alert_on: ZoneTrigger::Exit,
        }
    }

    /// Polygon zone with default priority and exit trigger.
    pub fn polygon(name: impl Into<String>, coordinates: Vec<Coordinates>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            shape: Shape::Polygon { coordinates },
            alert_on: ZoneTrigger::Exit,
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the alert trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: ZoneTrigger) -> Self {
        self.alert_on = trigger;
        self
    }

    /// Reject zones that cannot be evaluated.
    pub fn validate(&self) -> Result<(), ZoneError> {
        if self.name.trim().is_empty() {
            return Err(ZoneError::MissingName);
        }
        let coordinate_error = |source| ZoneError::InvalidCoordinate {
            name: self.name.clone(),
            source,
        };
        match &self.shape {
            Shape::Circle { center, radius } => {
                center.validate().map_err(coordinate_error)?;
                if !radius.is_finite() || *radius <= 0.0 {
                    return Err(ZoneError::InvalidRadius {
                        name: self.name.clone(),
                        radius: *radius,
                    });
                }
            }
            Shape::Polygon { coordinates } => {
                for vertex in coordinates {
                    vertex.validate().map_err(coordinate_error)?;
                }
                let count = distinct_vertices(coordinates);
                if count < 3 {
                    return Err(ZoneError::TooFewVertices {
                        name: self.name.clone(),
                        count,
                    });
                }
            }
        }
        Ok(())
    }

    /// Evaluation order: priority descending, then name ascending.
    pub fn precedence(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.name.cmp(&other.name))
    }
}

fn distinct_vertices(coordinates: &[Coordinates]) -> usize {
    let mut seen: Vec<(u64, u64)> = Vec::with_capacity(coordinates.len());
    for c in coordinates {
        // Normalise -0.0 so it matches 0.0.
        let key = ((c.lat + 0.0).to_bits(), (c.lng + 0.0).to_bits());
        if !seen.contains(&key) {
            seen.push(key);
        }
    }
    seen.len()
}

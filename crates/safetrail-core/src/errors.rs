//! Validation errors shared across crates.

use thiserror::Error;

/// A coordinate or required field failed validation.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ValidationError {
    /// Latitude is non-finite or outside `[-90, 90]`.
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    /// Longitude is non-finite or outside `[-180, 180]`.
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
    /// A required field was absent.
    #[error("{0} is required")]
    Missing(&'static str),
}

/// A zone definition was rejected at load time.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ZoneError {
    /// The zone has an empty name.
    #[error("zone name must not be empty")]
    MissingName,
    /// Circle radius is zero, negative or non-finite.
    #[error("zone {name}: radius must be a positive number of meters, got {radius}")]
    InvalidRadius {
        /// Zone name.
        name: String,
        /// Offending radius.
        radius: f64,
    },
    /// Polygon has fewer than three distinct vertices.
    #[error("zone {name}: polygon needs at least 3 distinct vertices, got {count}")]
    TooFewVertices {
        /// Zone name.
        name: String,
        /// Distinct vertex count.
        count: usize,
    },
    /// A center or vertex is out of range.
    #[error("zone {name}: {source}")]
    InvalidCoordinate {
        /// Zone name.
        name: String,
        /// Underlying coordinate error.
        source: ValidationError,
    },
}

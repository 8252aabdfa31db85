//! # safetrail-geofence
//!
//! Spatial predicates and the cached zone engine.
//!
//! - [`geometry`]: Haversine distance, ray-casting containment, centroids
//! - [`source`]: the [`ZoneSource`] seam to wherever zones are stored
//! - [`engine`]: [`GeofenceEngine`], a TTL-cached snapshot of validated zones
//! - [`crossing`]: entry/exit detection between two evaluations

#![deny(unsafe_code)]

pub mod crossing;
pub mod engine;
pub mod errors;
pub mod geometry;
pub mod source;

pub use crossing::{Crossing, CrossingDirection, crossings};
pub use engine::{Evaluation, GeofenceEngine, ZoneDistance, ZoneSnapshot};
pub use errors::GeofenceError;
pub use source::{ChangeHook, JsonFileZoneSource, StaticZoneSource, ZoneSource};

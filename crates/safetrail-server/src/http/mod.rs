//! JSON endpoints for alerts, zones and session status.

pub mod emergencies;
pub mod error;
pub mod geo;
pub mod status;

pub use error::{ApiError, ErrorBody};

//! Alert store errors.

use safetrail_core::AlertId;
use thiserror::Error;

/// Failure of an alert store operation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AlertError {
    /// No alert with this ID exists (never created, resolved and purged, or
    /// removed by the disconnect policy).
    #[error("emergency alert {0} not found")]
    NotFound(AlertId),
}

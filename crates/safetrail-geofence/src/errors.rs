//! Zone loading errors.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain zones from a [`ZoneSource`](crate::ZoneSource).
#[derive(Debug, Error)]
pub enum GeofenceError {
    /// The zone file could not be read.
    #[error("failed to read zone file {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The zone file is not valid zone JSON.
    #[error("failed to parse zone file {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

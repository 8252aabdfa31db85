//! # safetrail-core
//!
//! Shared vocabulary for the safetrail workspace.
//!
//! - **IDs**: [`SessionId`] and [`AlertId`], prefixed UUID v7 newtypes
//! - **Coordinates**: [`Coordinates`], [`LocationReport`] and [`Location`]
//! - **Roles**: [`Role`] (`tourist` or `authority`)
//! - **Zones**: [`Geofence`] definitions with load-time validation
//! - **Alerts**: the [`Alert`] record, its kind/status enums and the
//!   [`DisconnectPolicy`] applied when an originating session goes away
//! - **Logging**: [`logging::init_subscriber`]

#![deny(unsafe_code)]

pub mod alert;
pub mod errors;
pub mod ids;
pub mod location;
pub mod logging;
pub mod role;
pub mod zone;

pub use alert::{Alert, AlertKind, AlertPayload, AlertStatus, DisconnectPolicy, NewAlert};
pub use errors::{ValidationError, ZoneError};
pub use ids::{AlertId, SessionId};
pub use location::{Coordinates, Location, LocationReport};
pub use role::Role;
pub use zone::{Geofence, Shape, ZoneTrigger};

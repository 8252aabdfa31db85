//! # safetrail-server
//!
//! Axum HTTP + WebSocket server for real-time panic and geofence alerting.
//!
//! - [`hub`]: the shared context every connection and handler works through
//! - [`websocket`]: session registry, broadcast routing, per-connection
//!   supervision and the wire protocol
//! - [`housekeeper`]: liveness and retention sweeps
//! - [`http`]: JSON endpoints for alerts, zones and status
//! - [`server`]: router assembly, listener and graceful shutdown

#![deny(unsafe_code)]

pub mod health;
pub mod housekeeper;
pub mod http;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use hub::Hub;
pub use server::{AppState, SafetrailServer};

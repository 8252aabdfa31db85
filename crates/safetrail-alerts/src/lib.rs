//! # safetrail-alerts
//!
//! The emergency alert store.
//!
//! Alerts move `active → acknowledged → resolved`. Every state change is
//! reported to an [`AlertListener`] after the store lock is released, so a
//! listener that fans the change out to clients never observes (or causes)
//! a state older than the one it is announcing.

#![deny(unsafe_code)]

pub mod errors;
pub mod lifecycle;
pub mod listener;
pub mod store;

pub use errors::AlertError;
pub use lifecycle::Transition;
pub use listener::{AlertEvent, AlertListener};
pub use store::AlertStore;

//! Change notifications.

use safetrail_core::Alert;

/// A state change, carrying the alert as it is after the change.
#[derive(Clone, Debug, PartialEq)]
pub enum AlertEvent {
    /// A new alert was stored.
    Created(Alert),
    /// An alert moved to `acknowledged`.
    Acknowledged(Alert),
    /// An alert moved to `resolved`.
    Resolved(Alert),
}

impl AlertEvent {
    /// The alert after the change.
    pub fn alert(&self) -> &Alert {
        match self {
            Self::Created(a) | Self::Acknowledged(a) | Self::Resolved(a) => a,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Acknowledged(_) => "acknowledged",
            Self::Resolved(_) => "resolved",
        }
    }
}

/// Receives every alert state change.
///
/// Called synchronously on the mutating thread after the map lock is
/// released. Events arrive one at a time in mutation order. Implementations
/// must not block and must not create or transition alerts.
pub trait AlertListener: Send + Sync {
    /// Handle one change.
    fn on_alert_event(&self, event: &AlertEvent);
}

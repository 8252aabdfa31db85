//! Alert state transitions.
//!
//! ```text
//! active ──acknowledge──▶ acknowledged ──resolve──▶ resolved
//!    └──────────────────resolve───────────────────────▲
//! ```
//!
//! Repeating a transition, or acknowledging a resolved alert, leaves the
//! record untouched.

use chrono::{DateTime, Utc};
use safetrail_core::{Alert, AlertStatus};

/// Outcome of applying a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The alert changed state.
    Applied,
    /// The alert was already at or past the target state.
    Unchanged,
}

/// `active → acknowledged`.
pub fn acknowledge(alert: &mut Alert, actor: &str, at: DateTime<Utc>) -> Transition {
    match alert.status {
        AlertStatus::Active => {
            alert.status = AlertStatus::Acknowledged;
            alert.acknowledged_by = Some(actor.to_owned());
            alert.acknowledged_at = Some(at);
            Transition::Applied
        }
        AlertStatus::Acknowledged | AlertStatus::Resolved => Transition::Unchanged,
    }
}

/// `active | acknowledged → resolved`.
pub fn resolve(alert: &mut Alert, actor: &str, at: DateTime<Utc>) -> Transition {
    match alert.status {
        AlertStatus::Active | AlertStatus::Acknowledged => {
            alert.status = AlertStatus::Resolved;
            alert.resolved_by = Some(actor.to_owned());
            alert.resolved_at = Some(at);
            Transition::Applied
        }
        AlertStatus::Resolved => Transition::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use safetrail_core::{AlertId, AlertKind, AlertPayload, SessionId};

    fn fresh() -> Alert {
        Alert {
            id: AlertId::new(),
            session_id: SessionId::new(),
            kind: AlertKind::Panic,
            location: None,
            zone: None,
            payload: AlertPayload::default(),
            status: AlertStatus::Active,
            created_at: Utc::now(),
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
        }
    }

    #[test]
    fn acknowledge_stamps_once() {
        let mut alert = fresh();
        let t0 = Utc::now();
        assert_eq!(acknowledge(&mut alert, "officer-1", t0), Transition::Applied);
        assert_eq!(
            acknowledge(&mut alert, "officer-2", t0 + Duration::seconds(5)),
            Transition::Unchanged
        );
        assert_eq!(alert.status, AlertStatus::Acknowledged);
        assert_eq!(alert.acknowledged_by.as_deref(), Some("officer-1"));
        assert_eq!(alert.acknowledged_at, Some(t0));
    }

    #[test]
    fn resolve_from_active_skips_acknowledgement() {
        let mut alert = fresh();
        assert_eq!(resolve(&mut alert, "desk", Utc::now()), Transition::Applied);
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert!(alert.acknowledged_at.is_none());
    }

    #[test]
    fn resolved_is_terminal() {
        let mut alert = fresh();
        let at = Utc::now();
        let _ = resolve(&mut alert, "desk", at);
        assert_eq!(acknowledge(&mut alert, "late", Utc::now()), Transition::Unchanged);
        assert_eq!(resolve(&mut alert, "again", Utc::now()), Transition::Unchanged);
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.resolved_by.as_deref(), Some("desk"));
        assert_eq!(alert.resolved_at, Some(at));
        assert!(alert.acknowledged_by.is_none());
    }
}

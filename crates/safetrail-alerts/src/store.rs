//! In-memory alert store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use safetrail_core::{Alert, AlertId, AlertStatus, DisconnectPolicy, NewAlert, SessionId};
use tracing::{debug, info};

use crate::errors::AlertError;
use crate::lifecycle::{self, Transition};
use crate::listener::{AlertEvent, AlertListener};

type Apply = fn(&mut Alert, &str, DateTime<Utc>) -> Transition;

/// Alerts keyed by ID. IDs are time-ordered, so iteration is creation order.
///
/// Mutations that publish hold `order` from the write until the listener
/// returns, so listeners see events in the order the map changed. Listeners
/// must not call back into a publishing method.
#[derive(Default)]
pub struct AlertStore {
    alerts: RwLock<BTreeMap<AlertId, Alert>>,
    order: Mutex<()>,
    listener: Option<Arc<dyn AlertListener>>,
}

impl AlertStore {
    /// Empty store with no listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every state change to `listener`.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn AlertListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Store a new `active` alert. Never fails; unset payload fields get
    /// per-kind defaults.
    pub fn create(&self, new: NewAlert) -> Alert {
        let alert = Alert {
            id: AlertId::new(),
            session_id: new.session_id,
            kind: new.kind,
            location: new.location,
            zone: new.zone,
            payload: new.payload.with_defaults(new.kind),
            status: AlertStatus::Active,
            created_at: Utc::now(),
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
        };
        let _order = self.order.lock();
        let _ = self.alerts.write().insert(alert.id.clone(), alert.clone());
        info!(
            alert_id = %alert.id,
            session_id = %alert.session_id,
            kind = alert.kind.as_str(),
            has_location = alert.location.is_some(),
            "alert created"
        );
        self.publish(&AlertEvent::Created(alert.clone()));
        alert
    }

    /// Move an `active` alert to `acknowledged`. Idempotent.
    pub fn acknowledge(&self, id: &AlertId, actor: &str) -> Result<Alert, AlertError> {
        self.transition(id, actor, lifecycle::acknowledge, AlertEvent::Acknowledged)
    }

    /// Move an `active` or `acknowledged` alert to `resolved`. Idempotent.
    pub fn resolve(&self, id: &AlertId, actor: &str) -> Result<Alert, AlertError> {
        self.transition(id, actor, lifecycle::resolve, AlertEvent::Resolved)
    }

    fn transition(
        &self,
        id: &AlertId,
        actor: &str,
        apply: Apply,
        event: fn(Alert) -> AlertEvent,
    ) -> Result<Alert, AlertError> {
        let _order = self.order.lock();
        let (alert, outcome) = {
            let mut alerts = self.alerts.write();
            let alert = alerts
                .get_mut(id)
                .ok_or_else(|| AlertError::NotFound(id.clone()))?;
            let outcome = apply(alert, actor, Utc::now());
            (alert.clone(), outcome)
        };
        match outcome {
            Transition::Applied => {
                info!(alert_id = %id, actor, status = alert.status.as_str(), "alert updated");
                self.publish(&event(alert.clone()));
            }
            Transition::Unchanged => {
                debug!(alert_id = %id, actor, status = alert.status.as_str(), "alert transition was a no-op");
            }
        }
        Ok(alert)
    }

    /// One alert by ID.
    pub fn get(&self, id: &AlertId) -> Result<Alert, AlertError> {
        self.alerts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AlertError::NotFound(id.clone()))
    }

    /// Alerts still `active`, oldest first.
    pub fn list_active(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect()
    }

    /// Run `f` over the `active` alerts with no event in flight.
    ///
    /// Every alert passed to `f` has already been published as created, and
    /// no create or transition is published until `f` returns.
    pub fn with_active<R>(&self, f: impl FnOnce(Vec<Alert>) -> R) -> R {
        let _order = self.order.lock();
        f(self.list_active())
    }

    /// Every stored alert, oldest first.
    pub fn list_all(&self) -> Vec<Alert> {
        self.alerts.read().values().cloned().collect()
    }

    /// Count of `active` alerts.
    pub fn active_count(&self) -> usize {
        self.alerts.read().values().filter(|a| a.is_active()).count()
    }

    /// Count of stored alerts.
    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }

    /// Apply `policy` to the alerts raised by `session_id`. Returns the IDs
    /// removed.
    pub fn remove_for_session(
        &self,
        session_id: &SessionId,
        policy: DisconnectPolicy,
    ) -> Vec<AlertId> {
        if policy == DisconnectPolicy::Retain {
            return Vec::new();
        }
        let mut removed = Vec::new();
        self.alerts.write().retain(|id, alert| {
            let drop = alert.session_id == *session_id && policy.drops(alert);
            if drop {
                removed.push(id.clone());
            }
            !drop
        });
        if !removed.is_empty() {
            info!(session_id = %session_id, count = removed.len(), ?policy, "removed alerts of disconnected session");
        }
        removed
    }

    /// Delete alerts created more than `retention` before `now`, whatever
    /// their status. Returns how many were deleted.
    pub fn purge_expired(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let mut alerts = self.alerts.write();
        let before = alerts.len();
        alerts.retain(|_, alert| now.signed_duration_since(alert.created_at) <= retention);
        before - alerts.len()
    }

    fn publish(&self, event: &AlertEvent) {
        if let Some(listener) = &self.listener {
            listener.on_alert_event(event);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Per-connection state shared by the supervisor, registry and router.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use safetrail_core::{Geofence, Location, Role, SessionId};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One live real-time connection.
pub struct SessionHandle {
    /// Session ID.
    pub id: SessionId,
    /// Accept time.
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<Arc<String>>,
    role: Mutex<Role>,
    location: Mutex<Option<Location>>,
    zone: Mutex<Option<Geofence>>,
    last_seen: Mutex<Instant>,
    open: AtomicBool,
    dropped_messages: AtomicU64,
    close_reason: Mutex<Option<&'static str>>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Handle writing into `tx`, closed when `cancel` fires.
    pub fn new(id: SessionId, tx: mpsc::Sender<Arc<String>>, cancel: CancellationToken) -> Self {
        Self {
            id,
            connected_at: Utc::now(),
            tx,
            role: Mutex::new(Role::default()),
            location: Mutex::new(None),
            zone: Mutex::new(None),
            last_seen: Mutex::new(Instant::now()),
            open: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
            close_reason: Mutex::new(None),
            cancel,
        }
    }

    /// Current role.
    pub fn role(&self) -> Role {
        *self.role.lock()
    }

    /// Replace the role, returning the previous one.
    pub fn set_role(&self, role: Role) -> Role {
        std::mem::replace(&mut *self.role.lock(), role)
    }

    /// Last reported location.
    pub fn location(&self) -> Option<Location> {
        *self.location.lock()
    }

    /// Record a new location.
    pub fn set_location(&self, location: Location) {
        *self.location.lock() = Some(location);
    }

    /// Replace the zone the last location fell in, returning the previous.
    pub fn swap_zone(&self, zone: Option<Geofence>) -> Option<Geofence> {
        std::mem::replace(&mut *self.zone.lock(), zone)
    }

    /// Queue a frame without waiting.
    ///
    /// A full or closed queue closes the session: it receives nothing
    /// further, so what it did receive is a prefix of what was sent.
    pub fn send(&self, message: Arc<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            self.close_because("send_queue_full");
            false
        }
    }

    /// Still accepting frames.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Stop accepting frames and signal the connection to shut down.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.cancel.cancel();
    }

    /// Close and record why. Only the first reason sticks.
    pub fn close_because(&self, reason: &'static str) {
        let _ = self.close_reason.lock().get_or_insert(reason);
        self.close();
    }

    /// Reason given to the first [`close_because`](Self::close_because).
    pub fn close_reason(&self) -> Option<&'static str> {
        *self.close_reason.lock()
    }

    /// Fires when the session is closed or the server shuts down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record inbound traffic.
    pub fn mark_seen(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound traffic.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Frames dropped for this session.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Serializable view.
    pub fn info(&self) -> SessionInfo {
        let location = self.location();
        SessionInfo {
            id: self.id.clone(),
            connected_at: self.connected_at,
            user_type: self.role(),
            has_location: location.is_some(),
            last_update: location.map(|l| l.timestamp),
        }
    }
}

/// Point-in-time view of a session for status endpoints.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session ID.
    pub id: SessionId,
    /// Accept time.
    pub connected_at: DateTime<Utc>,
    /// Role.
    pub user_type: Role,
    /// Whether a location has been reported.
    pub has_location: bool,
    /// Time of the last location report.
    pub last_update: Option<DateTime<Utc>>,
}

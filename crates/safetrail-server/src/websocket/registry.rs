//! Live session registry.
//!
//! The map lock is held only to insert, remove or copy handles out. Every
//! traversal works on a [`snapshot`](ConnectionRegistry::snapshot).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use safetrail_core::{Location, Role, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::session::{SessionHandle, SessionInfo};

/// All live sessions, keyed by ID.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    send_queue: usize,
    shutdown: CancellationToken,
}

impl ConnectionRegistry {
    /// Registry whose sessions get `send_queue`-deep outbound queues and
    /// cancellation tokens derived from `shutdown`.
    pub fn new(send_queue: usize, shutdown: CancellationToken) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            send_queue: send_queue.max(1),
            shutdown,
        }
    }

    /// Add a session. Returns its handle and the receiving end of its
    /// outbound queue.
    pub fn register(&self) -> (Arc<SessionHandle>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(self.send_queue);
        let handle = Arc::new(SessionHandle::new(
            SessionId::new(),
            tx,
            self.shutdown.child_token(),
        ));
        let _ = self
            .sessions
            .write()
            .insert(handle.id.clone(), Arc::clone(&handle));
        debug!(session_id = %handle.id, "session registered");
        (handle, rx)
    }

    /// Handle for `id`.
    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(id).cloned()
    }

    /// Change a session's role. Returns the previous role.
    pub fn set_role(&self, id: &SessionId, role: Role) -> Option<Role> {
        self.get(id).map(|s| s.set_role(role))
    }

    /// Record a session's location. Returns whether the session exists.
    pub fn update_location(&self, id: &SessionId, location: Location) -> bool {
        self.get(id).map(|s| s.set_location(location)).is_some()
    }

    /// Remove a session and close it. Only the first call for an ID returns
    /// the handle.
    pub fn unregister(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.write().remove(id);
        if let Some(handle) = &removed {
            handle.close();
            debug!(session_id = %id, "session unregistered");
        }
        removed
    }

    /// Copy of every handle, in connect order.
    pub fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    /// Serializable views of every session, in connect order.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.snapshot().iter().map(|s| s.info()).collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

//! Frame fan-out to connected sessions.

use std::sync::Arc;

use parking_lot::Mutex;
use safetrail_core::{Role, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::protocol::ServerFrame;
use super::registry::ConnectionRegistry;
use super::session::SessionHandle;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Routes server frames to all sessions, a role, or one session.
///
/// Broadcasts are serialized: any two sessions receive the frames they both
/// got in the same relative order.
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
    dispatch: Mutex<()>,
}

impl BroadcastRouter {
    /// Router over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            dispatch: Mutex::new(()),
        }
    }

    /// Send to every open session except `exclude`. Returns the number
    /// delivered.
    pub fn to_all(&self, frame: &ServerFrame, exclude: Option<&SessionId>) -> usize {
        self.fan_out(frame, |s| exclude != Some(&s.id))
    }

    /// Send to every open session with `role`.
    pub fn to_role(&self, role: Role, frame: &ServerFrame) -> usize {
        self.fan_out(frame, |s| s.role() == role)
    }

    /// Send to a single session. Returns whether it was queued.
    pub fn to_session(&self, id: &SessionId, frame: &ServerFrame) -> bool {
        let Some(session) = self.registry.get(id) else {
            debug!(session_id = %id, frame_type = frame.frame_type(), "target session gone");
            return false;
        };
        if !session.is_open() {
            return false;
        }
        let Some(text) = encode(frame) else {
            return false;
        };
        let _guard = self.dispatch.lock();
        deliver(&session, text, frame.frame_type())
    }

    /// Register a new session and queue its greeting as the first frame it
    /// receives.
    pub fn admit(
        &self,
        greeting: impl FnOnce(&SessionHandle) -> ServerFrame,
    ) -> (Arc<SessionHandle>, mpsc::Receiver<Arc<String>>) {
        let _guard = self.dispatch.lock();
        let (session, rx) = self.registry.register();
        let frame = greeting(&session);
        if let Some(text) = encode(&frame) {
            let _ = deliver(&session, text, frame.frame_type());
        }
        (session, rx)
    }

    /// Set `session`'s role and queue `frames` to it with no other broadcast
    /// in between. Returns the previous role.
    pub fn assign_role(&self, session: &SessionHandle, role: Role, frames: &[ServerFrame]) -> Role {
        let encoded: Vec<_> = frames
            .iter()
            .filter_map(|f| encode(f).map(|text| (text, f.frame_type())))
            .collect();
        let _guard = self.dispatch.lock();
        let previous = session.set_role(role);
        for (text, frame_type) in encoded {
            if !session.is_open() || !deliver(session, text, frame_type) {
                break;
            }
        }
        previous
    }

    fn fan_out(&self, frame: &ServerFrame, include: impl Fn(&SessionHandle) -> bool) -> usize {
        let Some(text) = encode(frame) else {
            return 0;
        };
        let _guard = self.dispatch.lock();
        let mut delivered = 0;
        for session in self.registry.snapshot() {
            if !session.is_open() || !include(&session) {
                continue;
            }
            if deliver(&session, Arc::clone(&text), frame.frame_type()) {
                delivered += 1;
            }
        }
        debug!(frame_type = frame.frame_type(), delivered, "broadcast frame");
        delivered
    }
}

fn encode(frame: &ServerFrame) -> Option<Arc<String>> {
    match frame.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(frame_type = frame.frame_type(), error = %e, "failed to serialize frame");
            None
        }
    }
}

fn deliver(session: &SessionHandle, text: Arc<String>, frame_type: &'static str) -> bool {
    if session.send(text) {
        return true;
    }
    metrics::counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
    warn!(session_id = %session.id, frame_type, "delivery failed, closing session");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn setup(queue: usize) -> (Arc<ConnectionRegistry>, BroadcastRouter) {
        let registry = Arc::new(ConnectionRegistry::new(queue, CancellationToken::new()));
        let router = BroadcastRouter::new(Arc::clone(&registry));
        (registry, router)
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push((*text).clone());
        }
        out
    }

    #[test]
    fn to_all_honors_exclusion() {
        let (registry, router) = setup(8);
        let (a, mut ra) = registry.register();
        let (_b, mut rb) = registry.register();

        let n = router.to_all(&ServerFrame::pong(), Some(&a.id));
        assert_eq!(n, 1);
        assert!(drain(&mut ra).is_empty());
        assert_eq!(drain(&mut rb).len(), 1);
    }

    #[test]
    fn to_role_filters_by_role() {
        let (registry, router) = setup(8);
        let (a, mut ra) = registry.register();
        let (_b, mut rb) = registry.register();
        let _ = a.set_role(Role::Authority);

        assert_eq!(router.to_role(Role::Authority, &ServerFrame::pong()), 1);
        assert_eq!(drain(&mut ra).len(), 1);
        assert!(drain(&mut rb).is_empty());
    }

    #[test]
    fn to_session_unknown_is_false() {
        let (_registry, router) = setup(8);
        assert!(!router.to_session(&SessionId::new(), &ServerFrame::pong()));
    }

    #[test]
    fn admitted_session_hears_greeting_first() {
        let (registry, router) = setup(8);
        let (_a, _ra) = registry.register();
        let router = Arc::new(router);
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let noise = {
            let router = Arc::clone(&router);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    let _ = router.to_all(&ServerFrame::health_check(0, 0), None);
                    std::thread::yield_now();
                }
            })
        };
        for _ in 0..50 {
            let (session, mut rx) =
                router.admit(|s| ServerFrame::connection_established(s.id.clone()));
            let first = rx.try_recv().unwrap();
            assert!(first.contains("connection_established"), "got {first}");
            let _ = registry.unregister(&session.id);
        }
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        noise.join().unwrap();
    }

    #[test]
    fn assign_role_frames_are_contiguous() {
        let (registry, router) = setup(4096);
        let router = Arc::new(router);
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let noise = {
            let router = Arc::clone(&router);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    let _ = router.to_all(&ServerFrame::health_check(0, 0), None);
                    std::thread::yield_now();
                }
            })
        };
        let catch_up: Vec<_> = (0..3)
            .map(|i| ServerFrame::user_connected(SessionId::from_raw(format!("c{i}")), 0))
            .collect();
        for _ in 0..20 {
            let (session, mut rx) = registry.register();
            let _ = router.assign_role(&session, Role::Authority, &catch_up);
            let got = drain(&mut rx);
            let first = got.iter().position(|f| f.contains("user_connected")).unwrap();
            assert!(
                got[first..first + 3].iter().all(|f| f.contains("user_connected")),
                "interleaved: {got:?}"
            );
            let _ = registry.unregister(&session.id);
        }
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        noise.join().unwrap();
    }

    #[test]
    fn slow_session_receives_a_prefix() {
        let (registry, router) = setup(2);
        let (slow, mut rslow) = registry.register();
        let (_fast, _rfast) = registry.register();

        for i in 0..4 {
            let frame = ServerFrame::user_connected(SessionId::from_raw(format!("s{i}")), i);
            let _ = router.to_all(&frame, None);
        }
        // Frees room, but the session was closed on the first failure.
        let got = drain(&mut rslow);
        assert_eq!(got.len(), 2);
        assert!(got[0].contains("\"s0\""));
        assert!(got[1].contains("\"s1\""));
        assert!(!slow.is_open());

        let _ = router.to_all(&ServerFrame::pong(), None);
        assert!(drain(&mut rslow).is_empty());
    }

    #[test]
    fn shared_frames_arrive_in_same_order() {
        let (registry, router) = setup(64);
        let (_a, mut ra) = registry.register();
        let (_b, mut rb) = registry.register();
        let router = Arc::new(router);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let router = Arc::clone(&router);
                std::thread::spawn(move || {
                    for i in 0..8 {
                        let id = SessionId::from_raw(format!("t{t}-{i}"));
                        let _ = router.to_all(&ServerFrame::user_connected(id, 0), None);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let a = drain(&mut ra);
        let b = drain(&mut rb);
        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
    }
}

//! Who may acknowledge alerts.

use safetrail_core::Role;

use super::session::SessionHandle;

/// Decides whether a session may acknowledge an alert.
pub trait AcknowledgePolicy: Send + Sync {
    /// Whether `session` may acknowledge.
    fn may_acknowledge(&self, session: &SessionHandle) -> bool;
}

/// Trusts the role the client declared via `identify_user`.
///
/// Declared roles are unauthenticated. Deployments with real identity should
/// supply their own policy.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelfDeclaredRole;

impl AcknowledgePolicy for SelfDeclaredRole {
    fn may_acknowledge(&self, session: &SessionHandle) -> bool {
        session.role() == Role::Authority
    }
}

//! Real-time session layer.
//!
//! - [`registry`]: live sessions
//! - [`broadcast`]: ordered fan-out to sessions
//! - [`fanout`]: alert lifecycle events into broadcasts
//! - [`supervisor`]: per-connection frame handling and socket loop
//! - [`protocol`]: client and server frame types

pub mod authorize;
pub mod broadcast;
pub mod fanout;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod supervisor;

pub use authorize::{AcknowledgePolicy, SelfDeclaredRole};
pub use broadcast::BroadcastRouter;
pub use registry::ConnectionRegistry;
pub use session::{SessionHandle, SessionInfo};
pub use supervisor::SessionSupervisor;

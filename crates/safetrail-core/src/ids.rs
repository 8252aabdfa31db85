//! Branded ID newtypes.
//!
//! IDs are `<prefix>_<uuid v7>` strings. The UUID part is time-ordered and
//! fixed width, so comparing two IDs of the same type orders them by
//! generation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered ID.
            #[must_use]
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7().simple()))
            }

            /// Wrap an existing string without validation.
            #[must_use]
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifies one live real-time connection for the life of the process.
    SessionId, "sess"
}

branded_id! {
    /// Identifies one emergency alert.
    AlertId, "alert"
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_prefix_and_v7_suffix() {
        let id = SessionId::new();
        let suffix = id.as_str().strip_prefix("sess_").expect("prefix");
        let parsed = Uuid::parse_str(suffix).expect("valid uuid");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn alert_id_has_prefix() {
        assert!(AlertId::new().as_str().starts_with("alert_"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(AlertId::new(), AlertId::new());
    }

    #[test]
    fn ids_order_by_generation() {
        let ids: Vec<AlertId> = (0..64).map(|_| AlertId::new()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn from_raw_keeps_value() {
        let id = SessionId::from_raw("user-42");
        assert_eq!(id.as_str(), "user-42");
        assert_eq!(format!("{id}"), "user-42");
    }

    #[test]
    fn serde_is_transparent() {
        let id = AlertId::from("alert_x");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"alert_x\"");
        let back: AlertId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

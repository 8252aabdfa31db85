//! Session roles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Self-declared role of a session. Determines which broadcasts it receives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A traveller reporting locations and raising panics.
    #[default]
    Tourist,
    /// Safety personnel receiving alerts.
    #[serde(alias = "police")]
    Authority,
}

impl Role {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tourist => "tourist",
            Self::Authority => "authority",
        }
    }

    /// Whether this role receives authority-scoped broadcasts.
    pub fn is_authority(self) -> bool {
        self == Self::Authority
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

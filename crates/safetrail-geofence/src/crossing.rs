//! Boundary crossing detection between consecutive evaluations.

use safetrail_core::{Geofence, ZoneTrigger};

/// Direction of a crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrossingDirection {
    /// Moved into the zone.
    Enter,
    /// Moved out of the zone.
    Exit,
}

impl CrossingDirection {
    /// `enter` or `exit`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
        }
    }
}

/// A crossing that the zone's trigger says should alert.
#[derive(Clone, Debug, PartialEq)]
pub struct Crossing {
    /// Zone crossed.
    pub zone: Geofence,
    /// Direction.
    pub direction: CrossingDirection,
}

impl Crossing {
    /// Alert category for this crossing.
    pub fn emergency_type(&self) -> String {
        format!("geofence_{}", self.direction.as_str())
    }

    /// Alert message for this crossing.
    pub fn message(&self) -> String {
        match self.direction {
            CrossingDirection::Exit => format!("Left safe zone {}", self.zone.name),
            CrossingDirection::Enter => format!("Entered restricted zone {}", self.zone.name),
        }
    }
}

/// Alerting crossings when a session moves from `previous` to `current`.
///
/// Zones are identified by name. Exits are reported before entries.
pub fn crossings(previous: Option<&Geofence>, current: Option<&Geofence>) -> Vec<Crossing> {
    if previous.map(|z| z.name.as_str()) == current.map(|z| z.name.as_str()) {
        return Vec::new();
    }
    let exited = previous
        .filter(|z| z.alert_on == ZoneTrigger::Exit)
        .map(|z| Crossing {
            zone: z.clone(),
            direction: CrossingDirection::Exit,
        });
    let entered = current
        .filter(|z| z.alert_on == ZoneTrigger::Enter)
        .map(|z| Crossing {
            zone: z.clone(),
            direction: CrossingDirection::Enter,
        });
    exited.into_iter().chain(entered).collect()
}

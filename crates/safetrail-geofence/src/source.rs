//! Where zones come from.
//!
//! The engine never owns zone storage. It asks a [`ZoneSource`] for the
//! full set whenever its snapshot goes stale.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use safetrail_core::Geofence;
use serde::Deserialize;
use tracing::debug;

use crate::errors::GeofenceError;

/// Run by a source after its zones change.
pub type ChangeHook = Arc<dyn Fn() + Send + Sync>;

/// External zone store.
#[async_trait]
pub trait ZoneSource: Send + Sync {
    /// Return every zone currently defined, valid or not.
    async fn load_zones(&self) -> Result<Vec<Geofence>, GeofenceError>;

    /// Run `hook` after every mutation, replacing any earlier hook. Sources
    /// that cannot observe their own changes ignore it and are picked up
    /// when the engine's TTL expires.
    fn on_change(&self, hook: ChangeHook) {
        let _ = hook;
    }
}

/// In-memory zones, seeded from settings.
#[derive(Default)]
pub struct StaticZoneSource {
    zones: RwLock<Vec<Geofence>>,
    hook: RwLock<Option<ChangeHook>>,
}

impl StaticZoneSource {
    /// Source holding `zones`.
    pub fn new(zones: Vec<Geofence>) -> Self {
        Self {
            zones: RwLock::new(zones),
            hook: RwLock::new(None),
        }
    }

    /// Insert or replace the zone with the same name.
    pub fn upsert(&self, zone: Geofence) {
        {
            let mut zones = self.zones.write();
            match zones.iter_mut().find(|z| z.name == zone.name) {
                Some(existing) => *existing = zone,
                None => zones.push(zone),
            }
        }
        self.changed();
    }

    /// Remove a zone by name. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = {
            let mut zones = self.zones.write();
            let before = zones.len();
            zones.retain(|z| z.name != name);
            zones.len() != before
        };
        if removed {
            self.changed();
        }
        removed
    }

    fn changed(&self) {
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Number of stored zones.
    pub fn len(&self) -> usize {
        self.zones.read().len()
    }

    /// Whether no zones are stored.
    pub fn is_empty(&self) -> bool {
        self.zones.read().is_empty()
    }
}

#[async_trait]
impl ZoneSource for StaticZoneSource {
    async fn load_zones(&self) -> Result<Vec<Geofence>, GeofenceError> {
        Ok(self.zones.read().clone())
    }

    fn on_change(&self, hook: ChangeHook) {
        *self.hook.write() = Some(hook);
    }
}

/// Zones read from a JSON file on every load.
///
/// The file holds either a bare array of zones or `{"zones": [...]}`.
pub struct JsonFileZoneSource {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ZoneFile {
    List(Vec<Geofence>),
    Wrapped { zones: Vec<Geofence> },
}

impl JsonFileZoneSource {
    /// Source backed by `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ZoneSource for JsonFileZoneSource {
    async fn load_zones(&self) -> Result<Vec<Geofence>, GeofenceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| GeofenceError::Io {
                path: self.path.clone(),
                source,
            })?;
        let file: ZoneFile =
            serde_json::from_str(&content).map_err(|source| GeofenceError::Parse {
                path: self.path.clone(),
                source,
            })?;
        let zones = match file {
            ZoneFile::List(zones) | ZoneFile::Wrapped { zones } => zones,
        };
        debug!(path = %self.path.display(), count = zones.len(), "read zone file");
        Ok(zones)
    }
}

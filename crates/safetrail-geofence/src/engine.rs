//! Cached zone evaluation.
//!
//! The engine holds one immutable [`ZoneSnapshot`] behind a lock. Readers
//! clone the `Arc` and evaluate without holding the lock; refreshes build a
//! complete replacement and swap it in, so a reader sees either the old set
//! or the new one, never a mix.
//!
//! Evaluation never waits on the zone source. When the snapshot is older
//! than its TTL, or has been invalidated, the caller still gets the current
//! snapshot and a single background refresh is spawned on the ambient tokio
//! runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use safetrail_core::{Coordinates, Geofence};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::GeofenceError;
use crate::geometry;
use crate::source::ZoneSource;

/// Result of testing one point against the zone set.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// Whether any zone contains the point.
    pub inside: bool,
    /// First containing zone in precedence order.
    pub zone: Option<Geofence>,
}

impl Evaluation {
    /// Name of the containing zone.
    pub fn boundary(&self) -> Option<&str> {
        self.zone.as_ref().map(|z| z.name.as_str())
    }
}

/// A zone with its distance from a query point.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneDistance {
    /// The zone.
    pub zone: Geofence,
    /// Meters to the zone edge (circles) or centroid (polygons).
    pub distance_meters: f64,
}

/// An immutable, validated, precedence-ordered zone set.
#[derive(Debug)]
pub struct ZoneSnapshot {
    zones: Vec<Geofence>,
    loaded_at: Instant,
    generation: u64,
}

impl ZoneSnapshot {
    fn build(candidates: Vec<Geofence>, generation: u64) -> Self {
        let mut zones: Vec<Geofence> = candidates
            .into_iter()
            .filter(|zone| match zone.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(zone = %zone.name, error = %e, "rejecting invalid zone");
                    false
                }
            })
            .collect();
        zones.sort_by(Geofence::precedence);
        Self {
            zones,
            loaded_at: Instant::now(),
            generation,
        }
    }

    /// Zones in evaluation order.
    pub fn zones(&self) -> &[Geofence] {
        &self.zones
    }

    /// Incremented on every successful swap.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// First zone containing `point`.
    pub fn evaluate(&self, point: Coordinates) -> Evaluation {
        let zone = self
            .zones
            .iter()
            .find(|z| geometry::contains(&z.shape, point))
            .cloned();
        Evaluation {
            inside: zone.is_some(),
            zone,
        }
    }

    /// Up to `limit` zones sorted by ascending distance from `point`.
    /// Equal distances keep precedence order.
    pub fn nearest(&self, point: Coordinates, limit: usize) -> Vec<ZoneDistance> {
        let mut ranked: Vec<ZoneDistance> = self
            .zones
            .iter()
            .map(|zone| ZoneDistance {
                distance_meters: geometry::distance_to_zone(&zone.shape, point),
                zone: zone.clone(),
            })
            .collect();
        ranked.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        ranked.truncate(limit);
        ranked
    }
}

struct EngineInner {
    source: Arc<dyn ZoneSource>,
    snapshot: RwLock<Arc<ZoneSnapshot>>,
    ttl: Duration,
    invalidated: AtomicBool,
    refreshing: AtomicBool,
    generation: AtomicU64,
}

impl EngineInner {
    fn is_stale(&self, snapshot: &ZoneSnapshot) -> bool {
        self.invalidated.load(Ordering::Acquire) || snapshot.loaded_at.elapsed() >= self.ttl
    }

    fn install(&self, zones: Vec<Geofence>) -> usize {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(ZoneSnapshot::build(zones, generation));
        let count = snapshot.zones.len();
        *self.snapshot.write() = snapshot;
        count
    }

    async fn refresh(&self) -> Result<usize, GeofenceError> {
        // Cleared first so an invalidation during the load triggers another.
        self.invalidated.store(false, Ordering::Release);
        match self.source.load_zones().await {
            Ok(zones) => {
                let count = self.install(zones);
                info!(zones = count, "zone snapshot refreshed");
                Ok(count)
            }
            Err(e) => {
                // Keep serving the current zones for another TTL window.
                let mut snapshot = self.snapshot.write();
                *snapshot = Arc::new(ZoneSnapshot {
                    zones: snapshot.zones.clone(),
                    loaded_at: Instant::now(),
                    generation: snapshot.generation,
                });
                Err(e)
            }
        }
    }
}

/// TTL-cached zone evaluator. Cheap to clone.
#[derive(Clone)]
pub struct GeofenceEngine {
    inner: Arc<EngineInner>,
}

impl GeofenceEngine {
    /// Engine over `source`. The initial snapshot is empty and stale, so the
    /// first use schedules a load; call [`refresh`](Self::refresh) at boot to
    /// load eagerly.
    ///
    /// Registers a change hook on `source`, so sources that report their own
    /// mutations are reloaded without waiting for the TTL.
    pub fn new(source: Arc<dyn ZoneSource>, ttl: Duration) -> Self {
        let inner = Arc::new(EngineInner {
            source: Arc::clone(&source),
            snapshot: RwLock::new(Arc::new(ZoneSnapshot::build(Vec::new(), 0))),
            ttl,
            invalidated: AtomicBool::new(true),
            refreshing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        });
        // Weak: the engine owns the source, so a strong ref would cycle.
        let weak = Arc::downgrade(&inner);
        source.on_change(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                GeofenceEngine { inner }.invalidate();
            }
        }));
        Self { inner }
    }

    /// Load from the source now and swap the snapshot.
    pub async fn refresh(&self) -> Result<usize, GeofenceError> {
        self.inner.refresh().await
    }

    /// Swap in `zones` directly, bypassing the source.
    pub fn replace(&self, zones: Vec<Geofence>) -> usize {
        self.inner.invalidated.store(false, Ordering::Release);
        self.inner.install(zones)
    }

    /// Mark the snapshot stale and schedule a reload. Runs from the source's
    /// change hook; call it directly after editing a source that has none,
    /// such as a zone file.
    pub fn invalidate(&self) {
        self.inner.invalidated.store(true, Ordering::Release);
        self.schedule_refresh();
    }

    /// Current snapshot. Schedules a background refresh when stale.
    pub fn snapshot(&self) -> Arc<ZoneSnapshot> {
        let snapshot = self.inner.snapshot.read().clone();
        if self.inner.is_stale(&snapshot) {
            self.schedule_refresh();
        }
        snapshot
    }

    /// First zone containing `point`.
    pub fn evaluate(&self, point: Coordinates) -> Evaluation {
        self.snapshot().evaluate(point)
    }

    /// Up to `limit` zones nearest to `point`.
    pub fn nearest(&self, point: Coordinates, limit: usize) -> Vec<ZoneDistance> {
        self.snapshot().nearest(point, limit)
    }

    /// All zones in evaluation order.
    pub fn zones(&self) -> Vec<Geofence> {
        self.snapshot().zones().to_vec()
    }

    fn schedule_refresh(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime available, zone refresh deferred");
            return;
        };
        if self.inner.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let _ = runtime.spawn(async move {
            if let Err(e) = inner.refresh().await {
                warn!(error = %e, "zone refresh failed, keeping previous snapshot");
            }
            inner.refreshing.store(false, Ordering::Release);
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticZoneSource;
    use async_trait::async_trait;

    fn pt(lat: f64, lng: f64) -> Coordinates {
        Coordinates { lat, lng }
    }

    fn delhi() -> Geofence {
        Geofence::circle("Delhi", pt(28.6139, 77.2090), 5000.0)
    }

    fn engine_with(zones: Vec<Geofence>, ttl: Duration) -> (Arc<StaticZoneSource>, GeofenceEngine) {
        let source = Arc::new(StaticZoneSource::new(zones));
        let engine = GeofenceEngine::new(source.clone(), ttl);
        (source, engine)
    }

    async fn wait_for_generation(engine: &GeofenceEngine, generation: u64) {
        for _ in 0..200 {
            if engine.inner.snapshot.read().generation() >= generation {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("snapshot never reached generation {generation}");
    }

    #[tokio::test]
    async fn evaluates_delhi_circle() {
        let (_, engine) = engine_with(vec![delhi()], Duration::from_secs(300));
        assert_eq!(engine.refresh().await.unwrap(), 1);

        let hit = engine.evaluate(pt(28.6140, 77.2091));
        assert!(hit.inside);
        assert_eq!(hit.boundary(), Some("Delhi"));

        let miss = engine.evaluate(pt(19.0760, 72.8777));
        assert!(!miss.inside);
        assert_eq!(miss.boundary(), None);
    }

    #[tokio::test]
    async fn first_match_follows_precedence() {
        let zones = vec![
            Geofence::circle("b-wide", pt(0.0, 0.0), 10_000.0),
            Geofence::circle("a-wide", pt(0.0, 0.0), 10_000.0),
            Geofence::circle("z-core", pt(0.0, 0.0), 100.0).with_priority(10),
        ];
        let (_, engine) = engine_with(zones, Duration::from_secs(300));
        let _ = engine.refresh().await.unwrap();

        assert_eq!(engine.evaluate(pt(0.0, 0.0)).boundary(), Some("z-core"));
        assert_eq!(engine.evaluate(pt(0.0, 0.01)).boundary(), Some("a-wide"));
    }

    #[tokio::test]
    async fn invalid_zones_are_rejected_on_load() {
        let zones = vec![
            delhi(),
            Geofence::circle("zero", pt(0.0, 0.0), 0.0),
            Geofence::polygon("line", vec![pt(0.0, 0.0), pt(1.0, 1.0)]),
        ];
        let (_, engine) = engine_with(zones, Duration::from_secs(300));
        assert_eq!(engine.refresh().await.unwrap(), 1);
        assert_eq!(engine.zones()[0].name, "Delhi");
    }

    #[test]
    fn nearest_is_sorted_and_limited() {
        let zones = vec![
            Geofence::circle("far", pt(0.0, 3.0), 100.0),
            Geofence::circle("near", pt(0.0, 1.0), 100.0),
            Geofence::circle("mid", pt(0.0, 2.0), 100.0),
            Geofence::polygon(
                "square",
                vec![pt(1.0, 4.0), pt(1.0, 5.0), pt(2.0, 5.0), pt(2.0, 4.0)],
            ),
        ];
        let (_, engine) = engine_with(Vec::new(), Duration::from_secs(300));
        let _ = engine.replace(zones);

        let ranked = engine.nearest(pt(0.0, 0.0), 3);
        let names: Vec<&str> = ranked.iter().map(|r| r.zone.name.as_str()).collect();
        assert_eq!(names, ["near", "mid", "far"]);
        assert!(ranked.windows(2).all(|w| w[0].distance_meters <= w[1].distance_meters));
        assert_eq!(engine.nearest(pt(0.0, 0.0), 10).len(), 4);
        assert!(engine.nearest(pt(0.0, 0.0), 0).is_empty());
    }

    #[test]
    fn replace_swaps_whole_snapshot() {
        let (_, engine) = engine_with(Vec::new(), Duration::from_secs(300));
        let _ = engine.replace(vec![delhi()]);
        let before = engine.snapshot();
        let _ = engine.replace(Vec::new());
        // A reader holding the old snapshot keeps a consistent view.
        assert_eq!(before.zones().len(), 1);
        assert!(engine.zones().is_empty());
        assert!(engine.snapshot().generation() > before.generation());
    }

    #[tokio::test]
    async fn stale_snapshot_refreshes_in_background() {
        let (source, engine) = engine_with(vec![delhi()], Duration::ZERO);
        let _ = engine.refresh().await.unwrap();
        let generation = engine.snapshot().generation();

        source.upsert(Geofence::circle("Agra", pt(27.1767, 78.0081), 2000.0));
        // Still answers from the current snapshot while the reload runs.
        assert!(!engine.evaluate(pt(27.1767, 78.0081)).inside);
        wait_for_generation(&engine, generation + 1).await;
        assert!(engine.evaluate(pt(27.1767, 78.0081)).inside);
    }

    #[tokio::test]
    async fn source_mutation_invalidates_engine() {
        let (source, engine) = engine_with(vec![delhi()], Duration::from_secs(3600));
        let _ = engine.refresh().await.unwrap();
        let generation = engine.snapshot().generation();

        assert!(source.remove("Delhi"));
        wait_for_generation(&engine, generation + 1).await;
        assert!(!engine.evaluate(pt(28.6139, 77.2090)).inside);
    }

    #[tokio::test]
    async fn invalidate_schedules_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");
        std::fs::write(
            &path,
            r#"[{"name": "Gate", "type": "circle", "center": {"lat": 0, "lng": 0}, "radius": 50}]"#,
        )
        .unwrap();
        let engine = GeofenceEngine::new(
            Arc::new(crate::source::JsonFileZoneSource::new(&path)),
            Duration::from_secs(3600),
        );
        let _ = engine.refresh().await.unwrap();
        let generation = engine.snapshot().generation();

        std::fs::write(&path, "[]").unwrap();
        assert!(engine.evaluate(pt(0.0, 0.0)).inside, "cached until invalidated");
        engine.invalidate();
        wait_for_generation(&engine, generation + 1).await;
        assert!(!engine.evaluate(pt(0.0, 0.0)).inside);
    }

    struct FailingSource;

    #[async_trait]
    impl ZoneSource for FailingSource {
        async fn load_zones(&self) -> Result<Vec<Geofence>, GeofenceError> {
            Err(GeofenceError::Io {
                path: "zones.json".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            })
        }
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_zones() {
        let engine = GeofenceEngine::new(Arc::new(FailingSource), Duration::from_secs(300));
        let _ = engine.replace(vec![delhi()]);
        assert!(engine.refresh().await.is_err());
        assert_eq!(engine.zones().len(), 1);
        assert!(engine.evaluate(pt(28.6139, 77.2090)).inside);
    }

    struct ReplacedDuringLoad {
        engine: parking_lot::Mutex<Option<GeofenceEngine>>,
    }

    #[async_trait]
    impl ZoneSource for ReplacedDuringLoad {
        async fn load_zones(&self) -> Result<Vec<Geofence>, GeofenceError> {
            if let Some(engine) = self.engine.lock().take() {
                let _ = engine.replace(vec![delhi()]);
            }
            Err(GeofenceError::Io {
                path: "zones.json".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            })
        }
    }

    #[tokio::test]
    async fn failed_refresh_keeps_zones_replaced_mid_load() {
        let source = Arc::new(ReplacedDuringLoad {
            engine: parking_lot::Mutex::new(None),
        });
        let engine = GeofenceEngine::new(source.clone(), Duration::from_secs(300));
        *source.engine.lock() = Some(engine.clone());

        assert!(engine.refresh().await.is_err());
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(snapshot.zones()[0].name, "Delhi");
        assert!(!engine.inner.is_stale(&snapshot));
    }

    #[test]
    fn no_runtime_means_no_spawn() {
        let (_, engine) = engine_with(vec![delhi()], Duration::ZERO);
        // Stale and outside a runtime: answers from the empty snapshot.
        assert!(!engine.evaluate(pt(28.6139, 77.2090)).inside);
    }
}

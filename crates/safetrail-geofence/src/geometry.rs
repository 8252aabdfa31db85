//! Spherical distance and planar containment.
//!
//! Polygon containment is planar in (lng, lat) degrees, which is accurate
//! for city-scale zones away from the poles and the antimeridian.

use safetrail_core::{Coordinates, Shape};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters.
pub fn haversine_m(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Closed-disc test: a point exactly `radius` meters away is inside.
pub fn circle_contains(center: Coordinates, radius: f64, point: Coordinates) -> bool {
    haversine_m(center, point) <= radius
}

/// Even-odd ray casting, independent of winding.
///
/// Ties are half-open: a vertex is "above" the eastward ray only when it is
/// strictly north of the point. Horizontal edges therefore never count, so
/// points on a southern or western edge are inside and points on a northern
/// or eastern edge are outside.
pub fn polygon_contains(vertices: &[Coordinates], point: Coordinates) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let (x, y) = (point.lng, point.lat);
    let mut inside = false;
    for (i, vi) in vertices.iter().enumerate() {
        let vj = vertices[(i + n - 1) % n];
        if (vi.lat > y) != (vj.lat > y) {
            let x_cross = (vj.lng - vi.lng) * (y - vi.lat) / (vj.lat - vi.lat) + vi.lng;
            if x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

/// Arithmetic mean of the ring's vertices, ignoring a repeated closing vertex.
pub fn centroid(vertices: &[Coordinates]) -> Option<Coordinates> {
    let ring = match vertices {
        [first, .., last] if first == last => &vertices[..vertices.len() - 1],
        _ => vertices,
    };
    if ring.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = ring.len() as f64;
    let (lat, lng) = ring
        .iter()
        .fold((0.0, 0.0), |(lat, lng), v| (lat + v.lat, lng + v.lng));
    Some(Coordinates {
        lat: lat / count,
        lng: lng / count,
    })
}

/// Whether `shape` contains `point`.
pub fn contains(shape: &Shape, point: Coordinates) -> bool {
    match shape {
        Shape::Circle { center, radius } => circle_contains(*center, *radius, point),
        Shape::Polygon { coordinates } => polygon_contains(coordinates, point),
    }
}

/// Meters from `point` to the zone.
///
/// Circles give the distance to the edge (zero inside). Polygons give the
/// distance to the vertex centroid.
pub fn distance_to_zone(shape: &Shape, point: Coordinates) -> f64 {
    match shape {
        Shape::Circle { center, radius } => (haversine_m(*center, point) - radius).max(0.0),
        Shape::Polygon { coordinates } => {
            centroid(coordinates).map_or(f64::INFINITY, |c| haversine_m(c, point))
        }
    }
}

//! Polygon geometry for zones, backed by the `geo` crate.
//!
//! Coordinates are longitude/latitude in WGS84. Areas are planar (square
//! degrees) and only used for ordering; distances are great-circle metres.

use geo::{
    Area, BoundingRect, Closest, ClosestPoint, Contains, HaversineDistance, Intersects,
    LineString, Polygon,
};
use zone_core::{Point, ZoneBounds, ZoneError, ZoneResult};

pub const WGS84_SRID: i32 = 4326;

const MIN_RING_VERTICES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneGeometry {
    polygon: Polygon<f64>,
    bounds: ZoneBounds,
}

impl ZoneGeometry {
    /// Builds the zone ring from its vertices in the given order, closed by
    /// repeating the first vertex at the end whether or not the caller already
    /// did so. Rings with fewer than three distinct vertices are accepted here
    /// (a zone being drawn passes through them) but are not polygons.
    pub fn from_points(points: &[Point]) -> ZoneResult<Self> {
        let Some(first) = points.first() else {
            return Err(ZoneError::invalid_geometry("zone ring has no points"));
        };

        let mut ring: Vec<(f64, f64)> = points.iter().map(|p| (p.x(), p.y())).collect();
        ring.push((first.x(), first.y()));
        Self::from_polygon(Polygon::new(LineString::from(ring), vec![]))
    }

    /// Like `from_points`, but only for rings that enclose an area.
    pub fn polygon_from_points(points: &[Point]) -> ZoneResult<Self> {
        let distinct = distinct_vertices(points);
        if distinct < MIN_RING_VERTICES {
            return Err(ZoneError::invalid_geometry(format!(
                "polygon ring needs at least {MIN_RING_VERTICES} distinct points, got {distinct}"
            )));
        }
        Self::from_points(points)
    }

    pub fn from_json(raw: &str) -> ZoneResult<Self> {
        let polygon: Polygon<f64> = serde_json::from_str(raw)
            .map_err(|err| ZoneError::storage(format!("corrupt zone geometry: {err}")))?;
        Self::from_polygon(polygon)
    }

    pub fn to_json(&self) -> ZoneResult<String> {
        serde_json::to_string(&self.polygon)
            .map_err(|err| ZoneError::storage(format!("failed to encode zone geometry: {err}")))
    }

    fn from_polygon(polygon: Polygon<f64>) -> ZoneResult<Self> {
        let rect = polygon
            .bounding_rect()
            .ok_or_else(|| ZoneError::invalid_geometry("polygon has no vertices"))?;
        Ok(Self {
            bounds: ZoneBounds::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y),
            polygon,
        })
    }

    /// The closed exterior ring, first vertex repeated last.
    pub fn ring(&self) -> Vec<Point> {
        self.polygon
            .exterior()
            .points()
            .map(|vertex| Point::new(vertex.x(), vertex.y()))
            .collect()
    }

    pub fn bounds(&self) -> ZoneBounds {
        self.bounds
    }

    pub fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }

    /// Strict containment: points on the boundary are not inside.
    pub fn contains(&self, point: &Point) -> bool {
        self.bounds.contains(point) && self.polygon.contains(&to_geo(point))
    }

    pub fn intersects(&self, other: &ZoneGeometry) -> bool {
        self.polygon.intersects(&other.polygon)
    }

    /// Great-circle distance in metres from `point` to the nearest spot on the
    /// polygon. `None` when the point lies on or inside the polygon.
    pub fn distance_to(&self, point: &Point) -> Option<f64> {
        let target = to_geo(point);
        let nearest = match self.polygon.closest_point(&target) {
            Closest::SinglePoint(nearest) => nearest,
            Closest::Intersection(_) | Closest::Indeterminate => return None,
        };
        let distance = target.haversine_distance(&nearest);
        (distance > 0.0).then_some(distance)
    }
}

fn to_geo(point: &Point) -> geo::Point<f64> {
    geo::Point::new(point.x(), point.y())
}

fn distinct_vertices(points: &[Point]) -> usize {
    let mut keys: Vec<(u64, u64)> = points
        .iter()
        .map(|p| (p.x().to_bits(), p.y().to_bits()))
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys.len()
}

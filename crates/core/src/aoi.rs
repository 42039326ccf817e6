//! Area of interest

use crate::error::{Error, Result};
use geo::{BoundingRect, Contains, Coord, LineString, Point, Polygon, Rect};
use std::fmt::Write as _;

/// Geographic region under assessment (EPSG:4326 lon/lat).
///
/// Immutable once built; every stage borrows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    polygon: Polygon<f64>,
    bounds: Rect<f64>,
}

impl Aoi {
    /// Build from `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn from_bbox(bbox: [f64; 4]) -> Result<Self> {
        let [min_x, min_y, max_x, max_y] = bbox;
        if bbox.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "aoi",
                value: format!("{:?}", bbox),
                reason: "bounding box coordinates must be finite".into(),
            });
        }
        if min_x >= max_x || min_y >= max_y {
            return Err(Error::InvalidParameter {
                name: "aoi",
                value: format!("{:?}", bbox),
                reason: "expected [minLon, minLat, maxLon, maxLat] with min < max".into(),
            });
        }
        let rect = Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y });
        Ok(Self {
            polygon: rect.to_polygon(),
            bounds: rect,
        })
    }

    /// Build from a polygon exterior ring of `(lon, lat)` vertices.
    ///
    /// The ring is closed automatically.
    pub fn from_ring(ring: &[(f64, f64)]) -> Result<Self> {
        if ring.len() < 3 || ring.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "aoi",
                value: format!("{} vertices", ring.len()),
                reason: "polygon needs at least 3 finite vertices".into(),
            });
        }
        let exterior: LineString<f64> = ring.iter().copied().collect();
        let polygon = Polygon::new(exterior, vec![]);
        let bounds = polygon.bounding_rect().ok_or_else(|| Error::InvalidParameter {
            name: "aoi",
            value: format!("{} vertices", ring.len()),
            reason: "degenerate polygon".into(),
        })?;
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "aoi",
                value: format!("{} vertices", ring.len()),
                reason: "polygon has zero area".into(),
            });
        }
        Ok(Self { polygon, bounds })
    }

    /// Whether the point lies strictly inside the region
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygon.contains(&Point::new(x, y))
    }

    /// Bounding box (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        (min.x, min.y, max.x, max.y)
    }

    /// Whether the region's bounding box overlaps the given bounds
    pub fn intersects_bounds(&self, other: (f64, f64, f64, f64)) -> bool {
        let (min_x, min_y, max_x, max_y) = self.bounds();
        min_x < other.2 && other.0 < max_x && min_y < other.3 && other.1 < max_y
    }

    /// Canonical text form, stable across runs; used in cache keys.
    pub fn fingerprint(&self) -> String {
        let mut out = String::from("poly(");
        for (i, c) in self.polygon.exterior().coords().enumerate() {
            if i > 0 {
                out.push(';');
            }
            let _ = write!(out, "{:.9},{:.9}", c.x, c.y);
        }
        out.push(')');
        out
    }
}

//! Region presets: a fixed mapping from region names to geographic
//! bounding boxes. The slice order is the declared match order used by the
//! interpreter, so region detection stays deterministic.

use serde::{Deserialize, Serialize};

/// A rectangular geographic filter in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl BoundingBox {
    pub const fn new(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Self {
        Self {
            lon_min,
            lon_max,
            lat_min,
            lat_max,
        }
    }

    /// Inclusive on all four bounds.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.lon_min && lon <= self.lon_max && lat >= self.lat_min && lat <= self.lat_max
    }
}

/// Region used when a query names no known region.
pub const DEFAULT_REGION: &str = "pacific";

/// Region presets in declared match order. First substring match wins.
pub const REGION_PRESETS: &[(&str, BoundingBox)] = &[
    ("pacific", BoundingBox::new(-180.0, 180.0, -60.0, 60.0)),
    ("indian ocean", BoundingBox::new(20.0, 120.0, -40.0, 30.0)),
    ("near india", BoundingBox::new(68.0, 98.0, 6.0, 30.0)),
    ("arabian sea", BoundingBox::new(52.0, 68.0, 5.0, 24.0)),
];

/// Look up a region by name, case-insensitively.
pub fn region_bbox(name: &str) -> Option<BoundingBox> {
    let needle = name.trim().to_lowercase();
    REGION_PRESETS
        .iter()
        .find(|(region, _)| *region == needle)
        .map(|(_, bbox)| *bbox)
}

/// Bounding box for [`DEFAULT_REGION`].
pub fn default_bbox() -> BoundingBox {
    region_bbox(DEFAULT_REGION).unwrap_or(BoundingBox::new(-180.0, 180.0, -90.0, 90.0))
}

/// First region whose name appears in the (already lowercased) query text.
pub fn detect_region(query_lower: &str) -> Option<&'static str> {
    REGION_PRESETS
        .iter()
        .find(|(region, _)| query_lower.contains(region))
        .map(|(region, _)| *region)
}

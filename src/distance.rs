// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Helpers for integer ("MC2") coordinates, where 2^32 units span 360 degrees.

/// Mean radius of Earth used by the coordinate system, in meters.
const EARTH_RADIUS_M: f64 = 6378137.0;

/// Length of one coordinate unit along a meridian, in meters.
pub const MC2SCALE_TO_METER: f64 = EARTH_RADIUS_M * 2.0 * std::f64::consts::PI / 4294967296.0;

/// Number of coordinate units in one meter.
pub const METER_TO_MC2SCALE: f64 = 1.0 / MC2SCALE_TO_METER;

/// Converts coordinate units to radians.
pub const INV_RADIAN_FACTOR: f64 = std::f64::consts::PI / 2147483648.0;

/// Converts degrees into coordinate units.
pub fn deg_to_mc2(deg: f64) -> i32 {
    (deg * 4294967296.0 / 360.0).round() as i32
}

/// Converts coordinate units into degrees.
pub fn mc2_to_deg(v: i32) -> f64 {
    v as f64 * 360.0 / 4294967296.0
}

/// Returns the squared distance between two points, in squared coordinate units,
/// with the longitude difference scaled by the cosine of the mean latitude.
pub fn squared_mc2_distance(lat1: i32, lon1: i32, lat2: i32, lon2: i32) -> f64 {
    let mean_lat = (lat1 >> 1) + (lat2 >> 1);
    let cos_lat = (mean_lat as f64 * INV_RADIAN_FACTOR).cos();
    let dx = (lon1 as f64 - lon2 as f64) * cos_lat;
    let dy = lat1 as f64 - lat2 as f64;
    dx * dx + dy * dy
}

/// Returns the distance between two points, in meters.
pub fn distance_meters(lat1: i32, lon1: i32, lat2: i32, lon2: i32) -> f64 {
    squared_mc2_distance(lat1, lon1, lat2, lon2).sqrt() * MC2SCALE_TO_METER
}

/// An axis-aligned box over integer coordinates.
///
/// A freshly [reset](BoundingBox::reset) box is empty and contains no points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_lat: i32,
    pub min_lon: i32,
    pub max_lat: i32,
    pub max_lon: i32,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    pub const EMPTY: Self = Self {
        min_lat: i32::MAX,
        min_lon: i32::MAX,
        max_lat: i32::MIN,
        max_lon: i32::MIN,
    };

    pub fn reset(&mut self) {
        *self = Self::EMPTY;
    }

    pub fn is_empty(&self) -> bool {
        self.min_lat > self.max_lat || self.min_lon > self.max_lon
    }

    /// Extends the box to contain the given point.
    pub fn update(&mut self, lat: i32, lon: i32) {
        self.min_lat = self.min_lat.min(lat);
        self.max_lat = self.max_lat.max(lat);
        self.min_lon = self.min_lon.min(lon);
        self.max_lon = self.max_lon.max(lon);
    }

    /// Grows the box by the given amount of meters in every direction.
    /// Empty boxes are left untouched.
    pub fn increase_meters(&mut self, meters: u32) {
        if self.is_empty() {
            return;
        }

        let d_lat = (meters as f64 * METER_TO_MC2SCALE).round() as i64;
        let mid_lat = (self.min_lat as i64 + self.max_lat as i64) / 2;
        let cos_lat = (mid_lat as f64 * INV_RADIAN_FACTOR).cos().max(0.01);
        let d_lon = (meters as f64 * METER_TO_MC2SCALE / cos_lat).round() as i64;

        let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        self.min_lat = clamp(self.min_lat as i64 - d_lat);
        self.max_lat = clamp(self.max_lat as i64 + d_lat);
        self.min_lon = clamp(self.min_lon as i64 - d_lon);
        self.max_lon = clamp(self.max_lon as i64 + d_lon);
    }

    pub fn inside(&self, lat: i32, lon: i32) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// Height of the box in meters.
    pub fn height_meters(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            (self.max_lat as f64 - self.min_lat as f64) * MC2SCALE_TO_METER
        }
    }
}

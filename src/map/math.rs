// src/map/math.rs
//! Geodetic <-> world pixel projection (spherical Web Mercator, slippy-map numbering)

use crate::error::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Each tile is 256x256 px
pub const TILE_SIZE: u32 = 256;

/// Deepest supported zoom level. World coordinates at this level still fit a signed
/// 32-bit rectangle, which keeps the renderer side simple.
pub const MAX_LEVEL: u8 = 15;

/// Web Mercator valid latitude range
pub const MIN_LATITUDE: f64 = -85.05112878;
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Valid longitude range
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// A zoom level known to be within `0..=MAX_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ZoomLevel(u8);

impl ZoomLevel {
    pub const MIN: ZoomLevel = ZoomLevel(0);
    pub const MAX: ZoomLevel = ZoomLevel(MAX_LEVEL);

    pub fn new(level: u8) -> Result<Self> {
        if level > MAX_LEVEL {
            return Err(MapError::InvalidZoomLevel(level));
        }
        Ok(Self(level))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// World size in pixels along one axis
    pub fn world_size(self) -> u32 {
        size_for_level(self.0)
    }
}

impl TryFrom<u8> for ZoomLevel {
    type Error = MapError;

    fn try_from(level: u8) -> Result<Self> {
        ZoomLevel::new(level)
    }
}

impl From<ZoomLevel> for u8 {
    fn from(level: ZoomLevel) -> u8 {
        level.0
    }
}

impl std::fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPosition {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// A pixel position in world space at some zoom level, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WorldPosition {
    pub x: u32,
    pub y: u32,
}

impl WorldPosition {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Clamp `n` into `[min_value, max_value]`. NaN collapses to `min_value`.
#[inline]
pub fn clip(n: f64, min_value: f64, max_value: f64) -> f64 {
    n.max(min_value).min(max_value)
}

/// World size (pixels per axis) at `level`: `256 << level`.
#[inline]
pub fn size_for_level(level: u8) -> u32 {
    TILE_SIZE << level
}

/// Project a geographic position to world pixels at `level`.
///
/// Latitude and longitude are clamped to the projection domain first, so the result is
/// always a valid pixel in `[0, size_for_level(level))`.
pub fn geo_to_pixel(latitude: f64, longitude: f64, level: u8) -> (u32, u32) {
    let latitude = clip(latitude, MIN_LATITUDE, MAX_LATITUDE);
    let longitude = clip(longitude, MIN_LONGITUDE, MAX_LONGITUDE);

    let x = (longitude + 180.0) / 360.0;
    let sin_latitude = (latitude * PI / 180.0).sin();
    let y = 0.5 - ((1.0 + sin_latitude) / (1.0 - sin_latitude)).ln() / (4.0 * PI);

    let map_size = size_for_level(level) as f64;
    let px = clip(x * map_size + 0.5, 0.0, map_size - 1.0);
    let py = clip(y * map_size + 0.5, 0.0, map_size - 1.0);

    (px as u32, py as u32)
}

/// Inverse of [`geo_to_pixel`]: world pixel at `level` to latitude/longitude in degrees.
pub fn pixel_to_geo(px: u32, py: u32, level: u8) -> (f64, f64) {
    let map_size = size_for_level(level) as f64;
    let x = clip(px as f64, 0.0, map_size - 1.0) / map_size - 0.5;
    let y = 0.5 - clip(py as f64, 0.0, map_size - 1.0) / map_size;

    let latitude = 90.0 - 360.0 * (-y * 2.0 * PI).exp().atan() / PI;
    let longitude = 360.0 * x;

    (latitude, longitude)
}

/// Tile containing the given world pixel.
#[inline]
pub fn pixel_to_tile(px: u32, py: u32) -> (u32, u32) {
    (px / TILE_SIZE, py / TILE_SIZE)
}

/// Tile containing a geographic position at `level`.
pub fn geo_to_tile(latitude: f64, longitude: f64, level: u8) -> (u32, u32) {
    let (px, py) = geo_to_pixel(latitude, longitude, level);
    pixel_to_tile(px, py)
}

/// Ground resolution in degrees of longitude covered by one pixel at `level`.
pub fn degrees_per_pixel(level: u8) -> f64 {
    360.0 / size_for_level(level) as f64
}

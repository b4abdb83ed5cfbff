// src/error.rs
//! Error types for the moving map

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MapError>;

#[derive(Debug, Error)]
pub enum MapError {
    /// Requested zoom level is outside `0..=MAX_LEVEL`. Prior state is kept.
    #[error("invalid zoom level {0} (valid levels are 0-15)")]
    InvalidZoomLevel(u8),

    /// No source could supply the tile this frame. Retried on the next update.
    #[error("tile unavailable: level {level}, x {x}, y {y}")]
    TileUnavailable { level: u8, x: u32, y: u32 },

    /// Growing the patch list failed. The previous frame's patches are kept.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// Geodetic input that cannot be clamped into the projection domain (NaN, infinities).
    #[error("position out of range: lat {latitude}, lon {longitude}")]
    GeometryOutOfRange { latitude: f64, longitude: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("serial error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("error: {0}")]
    Other(String),
}

impl From<anyhow::Error> for MapError {
    fn from(error: anyhow::Error) -> Self {
        MapError::Other(error.to_string())
    }
}

impl MapError {
    /// True for failures that only degrade the current frame and heal on a later update.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MapError::TileUnavailable { .. } | MapError::AllocationFailure(_)
        )
    }
}

// src/map/tile.rs
//! Tile addressing, decoded tile images and the loader seam

use super::{geometry::Rect, math::TILE_SIZE};
use crate::error::Result;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Address of one 256x256 tile within a single imagery source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub level: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(level: u8, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    /// Area covered by the tile in world pixels
    pub fn world_rect(&self) -> Rect {
        let size = TILE_SIZE as i64;
        Rect::new(self.x as i64 * size, self.y as i64 * size, size, size)
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.x, self.y)
    }
}

/// A decoded, immutable image: a map tile or the marker sprite.
#[derive(Debug, Clone)]
pub struct TileImage {
    pixels: RgbaImage,
}

impl TileImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Solid-colour image, handy for placeholders and tests.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, image::Rgba(rgba)))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self::new(image.to_rgba8()))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)?;
        Ok(Self::new(image.to_rgba8()))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Shared handle to a cached image. The cache keeps one clone; every other clone is an
/// outstanding reference that pins the entry against eviction.
pub type TileHandle = Arc<TileImage>;

/// Fetches and decodes one tile. Called from a background worker, so it may block.
pub trait TileLoader: Send + Sync {
    fn load(&self, key: TileKey) -> Result<TileImage>;

    /// Short identifier used in logs
    fn describe(&self) -> String {
        String::from("tile loader")
    }
}

/// Reads pre-rendered tiles from a `<base>/<level>/<x>/<y>.<ext>` directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryTileLoader {
    base: PathBuf,
    extension: String,
}

impl DirectoryTileLoader {
    pub fn new(base: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            extension: extension.into(),
        }
    }

    pub fn tile_path(&self, key: TileKey) -> PathBuf {
        Self::path_for(&self.base, &self.extension, key)
    }

    fn path_for(base: &Path, extension: &str, key: TileKey) -> PathBuf {
        base.join(format!("{}/{}/{}.{}", key.level, key.x, key.y, extension))
    }
}

impl TileLoader for DirectoryTileLoader {
    fn load(&self, key: TileKey) -> Result<TileImage> {
        let bytes = std::fs::read(self.tile_path(key))?;
        TileImage::decode(&bytes)
    }

    fn describe(&self) -> String {
        self.base.display().to_string()
    }
}

// src/map/mod.rs
//! Moving map: projection, tile caching, frame composition and the viewport

pub mod compositor;
pub mod geometry;
pub mod math;
pub mod renderer;
pub mod source_chain;
pub mod tile;
pub mod tile_cache;
pub mod viewport;

pub use compositor::{MarkerPatch, Patch, PatchCompositor, TileRange};
pub use geometry::Rect;
pub use math::{geo_to_pixel, geo_to_tile, pixel_to_geo, GeoPosition, WorldPosition, ZoomLevel};
pub use renderer::{DrawCall, RecordingRenderer, Renderer};
pub use source_chain::{ChainStats, TileSourceChain};
pub use tile::{DirectoryTileLoader, TileHandle, TileImage, TileKey, TileLoader};
pub use tile_cache::{CacheStats, TileCache};
pub use viewport::{Marker, RoamState, ViewportController, FOLLOW_MARGIN, MANIPULATE_TIMEOUT};

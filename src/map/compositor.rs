// src/map/compositor.rs
//! Per-frame patch list: which piece of which tile lands where in the viewport

use super::geometry::Rect;
use super::math::{size_for_level, TILE_SIZE};
use super::source_chain::TileSourceChain;
use super::tile::{TileHandle, TileKey};
use crate::error::{MapError, Result};

/// One piece of imagery placed into the frame.
#[derive(Debug, Clone)]
pub struct Patch {
    /// Tile-local source area (0..256)
    pub src: Rect,
    /// Viewport-local destination area
    pub dst: Rect,
    pub image: TileHandle,
}

/// Visible part of the marker sprite for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerPatch {
    /// Sprite-local source area
    pub src: Rect,
    /// Viewport-local destination area
    pub dst: Rect,
}

/// Inclusive range of tile indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub first_x: u32,
    pub first_y: u32,
    pub last_x: u32,
    pub last_y: u32,
}

impl TileRange {
    pub fn columns(&self) -> usize {
        (self.last_x - self.first_x + 1) as usize
    }

    pub fn rows(&self) -> usize {
        (self.last_y - self.first_y + 1) as usize
    }

    pub fn count(&self) -> usize {
        self.columns() * self.rows()
    }

    /// Row-major walk over the range
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> {
        let (first_x, last_x) = (self.first_x, self.last_x);
        (self.first_y..=self.last_y).flat_map(move |y| (first_x..=last_x).map(move |x| (x, y)))
    }
}

/// Tiles overlapping `viewport` (world coordinates) at `level`, clipped to the grid.
pub fn visible_tiles(viewport: &Rect, level: u8) -> Option<TileRange> {
    let world = Rect::new(0, 0, size_for_level(level) as i64, size_for_level(level) as i64);
    let area = viewport.intersect(&world)?;
    let tile = TILE_SIZE as i64;

    Some(TileRange {
        first_x: (area.x / tile) as u32,
        first_y: (area.y / tile) as u32,
        last_x: ((area.right() - 1) / tile) as u32,
        last_y: ((area.bottom() - 1) / tile) as u32,
    })
}

/// Marker sprite area visible in the viewport, `None` when it is off screen.
pub fn marker_patch(viewport: &Rect, marker_box: &Rect) -> Option<MarkerPatch> {
    let area = viewport.intersect(marker_box)?;
    Some(MarkerPatch {
        src: area.relative_to(marker_box.x, marker_box.y),
        dst: area.relative_to(viewport.x, viewport.y),
    })
}

/// Holds the patch list of the current frame. Handles in the list are the only
/// references keeping tiles pinned in their caches.
#[derive(Debug, Default)]
pub struct PatchCompositor {
    patches: Vec<Patch>,
    marker: Option<MarkerPatch>,
}

impl PatchCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the tile patches for `viewport` at `level`.
    ///
    /// Room for the new list is secured before anything is released, so an allocation
    /// failure leaves the previous frame intact. Missing tiles are skipped and asked for
    /// again on the next rebuild.
    pub fn rebuild(&mut self, viewport: &Rect, level: u8, chain: &mut TileSourceChain) -> Result<()> {
        let Some(range) = visible_tiles(viewport, level) else {
            self.patches.clear();
            return Ok(());
        };

        let needed = range.count();
        self.patches
            .try_reserve(needed.saturating_sub(self.patches.len()))
            .map_err(|e| MapError::AllocationFailure(format!("{} patches: {}", needed, e)))?;

        // Release last frame's references before asking caches for new tiles
        self.patches.clear();

        for (tile_x, tile_y) in range.iter() {
            let Some(image) = chain.request_tile(level, tile_x, tile_y) else {
                continue;
            };
            let tile = TileKey::new(level, tile_x, tile_y).world_rect();
            let Some(area) = viewport.intersect(&tile) else {
                continue;
            };
            self.patches.push(Patch {
                src: area.relative_to(tile.x, tile.y),
                dst: area.relative_to(viewport.x, viewport.y),
                image,
            });
        }
        Ok(())
    }

    pub fn update_marker(&mut self, viewport: &Rect, marker_box: &Rect) {
        self.marker = marker_patch(viewport, marker_box);
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn marker(&self) -> Option<MarkerPatch> {
        self.marker
    }

    /// Drop every held tile reference
    pub fn clear(&mut self) {
        self.patches.clear();
        self.marker = None;
    }
}

// src/map/renderer.rs
//! Drawing backend the map hands its frame to

use super::geometry::Rect;
use super::tile::TileImage;

/// Pixel-pushing side of the instrument. The map only calls into it.
pub trait Renderer {
    /// Gauge width in pixels
    fn width(&self) -> u32;

    /// Gauge height in pixels
    fn height(&self) -> u32;

    /// Copy `src` of `image` to `dst` (gauge-local).
    fn blit(&mut self, image: &TileImage, src: Rect, dst: Rect);

    /// Copy `src` of `image` to `dst`, rotated clockwise by `angle` degrees about its centre.
    fn blit_rotated(&mut self, image: &TileImage, src: Rect, angle: f32, dst: Rect);

    /// Frame the gauge
    fn draw_outline(&mut self);
}

/// Renderer that remembers every call; backs the test suites and dry runs.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    width: u32,
    height: u32,
    pub calls: Vec<DrawCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Blit { src: Rect, dst: Rect },
    BlitRotated { src: Rect, angle: f32, dst: Rect },
    Outline,
}

impl RecordingRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            calls: Vec::new(),
        }
    }

    pub fn blits(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, DrawCall::Blit { .. }))
            .count()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl Renderer for RecordingRenderer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn blit(&mut self, _image: &TileImage, src: Rect, dst: Rect) {
        self.calls.push(DrawCall::Blit { src, dst });
    }

    fn blit_rotated(&mut self, _image: &TileImage, src: Rect, angle: f32, dst: Rect) {
        self.calls.push(DrawCall::BlitRotated { src, angle, dst });
    }

    fn draw_outline(&mut self) {
        self.calls.push(DrawCall::Outline);
    }
}

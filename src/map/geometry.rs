// src/map/geometry.rs
//! Integer rectangles in world, tile-local and viewport-local pixel space

/// Axis-aligned rectangle, `x`/`y` top-left, `w`/`h` extent in pixels.
///
/// Coordinates are signed 64-bit so world rectangles at the deepest level and
/// off-world marker boxes (negative top-left) are both representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl Rect {
    pub const fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> i64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.h
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.w * self.h
        }
    }

    /// Overlap of two rectangles, `None` when they do not share any pixel.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        if self.is_empty() || other.is_empty() {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right <= x || bottom <= y {
            return None;
        }
        Some(Rect::new(x, y, right - x, bottom - y))
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersect(other).is_some()
    }

    /// Same rectangle shifted by `(-dx, -dy)`: re-expresses it relative to a new origin.
    pub fn relative_to(&self, dx: i64, dy: i64) -> Rect {
        Rect::new(self.x - dx, self.y - dy, self.w, self.h)
    }

    pub fn contains_point(&self, px: i64, py: i64) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }
}

// src/map/viewport.rs
//! Viewport controller: zoom, scroll position, marker and the follow/roam machine
//!
//! The viewport normally follows the marker, recentring when the marker gets within
//! [`FOLLOW_MARGIN`] pixels of an edge or leaves the view. Any manual scroll switches
//! to roaming; the first marker update seen [`MANIPULATE_TIMEOUT`] after the last
//! scroll switches back to following and recentres.

use super::compositor::{MarkerPatch, Patch, PatchCompositor};
use super::geometry::Rect;
use super::math::{geo_to_pixel, pixel_to_geo, GeoPosition, WorldPosition, ZoomLevel};
use super::renderer::Renderer;
use super::source_chain::{ChainStats, TileSourceChain};
use super::tile::{TileHandle, TileImage};
use super::tile_cache::TileCache;
use crate::clock::{Clock, SystemClock};
use crate::config::MapConfig;
use crate::error::{MapError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Time after which the viewport re-ties to the marker
pub const MANIPULATE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Recentre when the marker bounding box comes this close to a viewport edge
pub const FOLLOW_MARGIN: i64 = 10;

/// Sprite used when the configured marker image cannot be read
const FALLBACK_SPRITE_SIZE: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoamState {
    /// Viewport tracks the marker
    Following,
    /// Viewport moved by hand at `since`; marker updates leave it alone
    Roaming { since: Instant },
}

impl RoamState {
    pub fn is_roaming(&self) -> bool {
        matches!(self, RoamState::Roaming { .. })
    }
}

/// Position and heading indicator drawn over the map.
#[derive(Debug, Clone)]
pub struct Marker {
    /// Centre of the sprite in world pixels
    pub position: WorldPosition,
    /// Degrees, 0-360
    pub heading: f32,
    sprite: TileHandle,
}

impl Marker {
    fn new(sprite: TileHandle) -> Self {
        Self {
            position: WorldPosition::default(),
            heading: 0.0,
            sprite,
        }
    }

    pub fn sprite(&self) -> &TileImage {
        &self.sprite
    }

    fn left(&self) -> i64 {
        self.position.x as i64 - self.sprite.width() as i64 / 2
    }

    fn top(&self) -> i64 {
        self.position.y as i64 - self.sprite.height() as i64 / 2
    }

    /// Sprite bounding box in world pixels
    pub fn world_box(&self) -> Rect {
        Rect::new(
            self.left(),
            self.top(),
            self.sprite.width() as i64,
            self.sprite.height() as i64,
        )
    }
}

pub struct ViewportController {
    width: u32,
    height: u32,
    level: ZoomLevel,
    world_x: u32,
    world_y: u32,
    marker: Marker,
    roam: RoamState,
    chain: TileSourceChain,
    compositor: PatchCompositor,
    clock: Box<dyn Clock>,
    dirty: bool,
}

impl ViewportController {
    /// Controller for a `width` x `height` gauge at level 0, origin (0, 0), following.
    pub fn new(
        width: u32,
        height: u32,
        chain: TileSourceChain,
        sprite: TileHandle,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            width,
            height,
            level: ZoomLevel::MIN,
            world_x: 0,
            world_y: 0,
            marker: Marker::new(sprite),
            roam: RoamState::Following,
            chain,
            compositor: PatchCompositor::new(),
            clock,
            dirty: true,
        }
    }

    /// Build caches, sprite and initial view from a configuration.
    pub fn from_config(config: &MapConfig) -> Result<Self> {
        config.validate()?;

        let capacity = config
            .cache_capacity
            .unwrap_or_else(|| TileCache::capacity_for_viewport(config.width, config.height));
        let chain =
            TileSourceChain::from_config(&config.tile_sources, capacity, config.max_concurrent_loads);

        let sprite = match TileImage::open(&config.marker_sprite) {
            Ok(sprite) => sprite,
            Err(e) => {
                warn!(
                    path = %config.marker_sprite.display(),
                    error = %e,
                    "marker sprite unavailable, using placeholder"
                );
                TileImage::filled(FALLBACK_SPRITE_SIZE, FALLBACK_SPRITE_SIZE, [255, 255, 255, 255])
            }
        };

        let mut controller = Self::new(
            config.width,
            config.height,
            chain,
            Arc::new(sprite),
            Box::new(SystemClock),
        );
        controller.set_level(config.initial_level)?;
        controller.set_marker_position(
            config.initial_position.latitude,
            config.initial_position.longitude,
        )?;
        controller.center_on_marker(false);

        info!(
            width = config.width,
            height = config.height,
            level = config.initial_level,
            sources = controller.chain.len(),
            capacity,
            "moving map ready"
        );
        Ok(controller)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn level(&self) -> u8 {
        self.level.get()
    }

    /// Viewport origin in world pixels
    pub fn origin(&self) -> WorldPosition {
        WorldPosition::new(self.world_x, self.world_y)
    }

    /// Viewport rectangle in world pixels
    pub fn viewport(&self) -> Rect {
        Rect::new(
            self.world_x as i64,
            self.world_y as i64,
            self.width as i64,
            self.height as i64,
        )
    }

    pub fn marker(&self) -> &Marker {
        &self.marker
    }

    pub fn marker_geo(&self) -> GeoPosition {
        let (latitude, longitude) =
            pixel_to_geo(self.marker.position.x, self.marker.position.y, self.level.get());
        GeoPosition::new(latitude, longitude)
    }

    /// Geographic position under the centre of the viewport
    pub fn center_geo(&self) -> GeoPosition {
        let (latitude, longitude) = pixel_to_geo(
            self.world_x + self.width / 2,
            self.world_y + self.height / 2,
            self.level.get(),
        );
        GeoPosition::new(latitude, longitude)
    }

    pub fn roam_state(&self) -> RoamState {
        self.roam
    }

    /// True when something changed since the last `render`
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn patches(&self) -> &[Patch] {
        self.compositor.patches()
    }

    pub fn marker_patch(&self) -> Option<MarkerPatch> {
        self.compositor.marker()
    }

    pub fn chain_stats(&self) -> ChainStats {
        self.chain.stats()
    }

    /// Switch zoom level, keeping the place under the viewport origin and the marker.
    ///
    /// Returns `Ok(false)` when already at `level`; levels past 15 are rejected and
    /// leave everything as it was.
    pub fn set_level(&mut self, level: u8) -> Result<bool> {
        let level = ZoomLevel::new(level)?;
        if level == self.level {
            return Ok(false);
        }

        let old = self.level.get();
        let (lat, lon) = pixel_to_geo(self.world_x, self.world_y, old);
        let (new_x, new_y) = geo_to_pixel(lat, lon, level.get());
        // Same for the marker
        let (marker_lat, marker_lon) =
            pixel_to_geo(self.marker.position.x, self.marker.position.y, old);

        self.level = level;
        self.dirty = true;
        debug!(from = old, to = level.get(), "zoom level changed");

        self.set_viewport(new_x as i64, new_y as i64, false);
        self.place_marker(marker_lat, marker_lon);
        Ok(true)
    }

    /// Move the marker to a new geographic position.
    ///
    /// Returns `Ok(false)` when the position lands on the same pixel. Non-finite input is
    /// rejected; anything else is clamped into the projection domain.
    pub fn set_marker_position(&mut self, latitude: f64, longitude: f64) -> Result<bool> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(MapError::GeometryOutOfRange { latitude, longitude });
        }
        Ok(self.place_marker(latitude, longitude))
    }

    fn place_marker(&mut self, latitude: f64, longitude: f64) -> bool {
        self.expire_roaming();

        let (new_x, new_y) = geo_to_pixel(latitude, longitude, self.level.get());
        let position = WorldPosition::new(new_x, new_y);
        if position == self.marker.position {
            return false;
        }

        self.marker.position = position;
        if self.roam == RoamState::Following {
            self.follow_marker();
        }
        self.dirty = true;
        true
    }

    /// Roaming ends opportunistically, on the first marker update after the timeout.
    fn expire_roaming(&mut self) {
        if let RoamState::Roaming { since } = self.roam {
            if self.clock.now().saturating_duration_since(since) >= MANIPULATE_TIMEOUT {
                debug!("roaming timed out, following marker again");
                self.roam = RoamState::Following;
                self.center_on_marker(true);
            }
        }
    }

    /// Set the marker heading in degrees, clamped to 0-360.
    pub fn set_marker_heading(&mut self, heading: f32) -> bool {
        let heading = heading.max(0.0).min(360.0);
        if heading == self.marker.heading {
            return false;
        }
        self.marker.heading = heading;
        self.dirty = true;
        true
    }

    /// Scroll by hand. Puts the viewport in roaming mode until [`MANIPULATE_TIMEOUT`]
    /// after the last call.
    pub fn manipulate_viewport(&mut self, dx: i64, dy: i64, animated: bool) -> bool {
        if !self.roam.is_roaming() {
            debug!("viewport manipulated, roaming");
        }
        self.roam = RoamState::Roaming {
            since: self.clock.now(),
        };
        self.set_viewport(self.world_x as i64 + dx, self.world_y as i64 + dy, animated)
    }

    /// Scroll by an increment without leaving the current roam state.
    pub fn move_viewport(&mut self, dx: i64, dy: i64, animated: bool) -> bool {
        self.set_viewport(self.world_x as i64 + dx, self.world_y as i64 + dy, animated)
    }

    /// Put the marker centre in the middle of the viewport.
    pub fn center_on_marker(&mut self, animated: bool) -> bool {
        self.set_viewport(
            self.marker.position.x as i64 - self.width as i64 / 2,
            self.marker.position.y as i64 - self.height as i64 / 2,
            animated,
        )
    }

    /// Recentre if the marker left the view or is within [`FOLLOW_MARGIN`] of an edge.
    ///
    /// Returns true if the viewport moved.
    pub fn follow_marker(&mut self) -> bool {
        let viewport = self.viewport();
        let marker = self.marker.world_box();

        if !viewport.intersects(&marker) {
            return self.center_on_marker(true);
        }

        let near_edge = marker.x <= viewport.x + FOLLOW_MARGIN
            || marker.right() >= viewport.right() - FOLLOW_MARGIN
            || marker.y <= viewport.y + FOLLOW_MARGIN
            || marker.bottom() >= viewport.bottom() - FOLLOW_MARGIN;
        if near_edge {
            return self.center_on_marker(true);
        }
        false
    }

    /// Move the viewport origin to an absolute world position, clamped to the map.
    ///
    /// `animated` is accepted for callers that would like a transition, but every move
    /// is currently an immediate jump. Returns false if the origin did not change.
    pub fn set_viewport(&mut self, x: i64, y: i64, animated: bool) -> bool {
        let size = self.level.world_size() as i64;
        let x = x.clamp(0, (size - self.width as i64).max(0)) as u32;
        let y = y.clamp(0, (size - self.height as i64).max(0)) as u32;

        if x == self.world_x && y == self.world_y {
            return false;
        }

        trace!(x, y, animated, "viewport moved");
        self.world_x = x;
        self.world_y = y;
        self.dirty = true;
        true
    }

    /// Rebuild the frame: tile patches for the visible range and the marker patch.
    ///
    /// Tiles that are not ready are left out and asked for again next time. On an
    /// allocation failure the previous tile patches are kept and the error is returned;
    /// the marker patch is refreshed either way.
    pub fn update(&mut self, dt: Duration) -> Result<()> {
        let viewport = self.viewport();
        let rebuilt = self
            .compositor
            .rebuild(&viewport, self.level.get(), &mut self.chain);
        self.compositor
            .update_marker(&viewport, &self.marker.world_box());

        trace!(
            dt_ms = dt.as_millis() as u64,
            patches = self.compositor.patches().len(),
            marker = self.compositor.marker().is_some(),
            "frame updated"
        );

        if let Err(e) = &rebuilt {
            warn!(error = %e, "frame update skipped");
        }
        rebuilt
    }

    /// Draw the current frame: tiles, then the rotated marker, then the outline.
    pub fn render(&mut self, renderer: &mut dyn Renderer) {
        for patch in self.compositor.patches() {
            renderer.blit(&patch.image, patch.src, patch.dst);
        }
        if let Some(marker) = self.compositor.marker() {
            renderer.blit_rotated(&self.marker.sprite, marker.src, self.marker.heading, marker.dst);
        }
        renderer.draw_outline();
        self.dirty = false;
    }
}

impl std::fmt::Debug for ViewportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportController")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("level", &self.level)
            .field("origin", &(self.world_x, self.world_y))
            .field("marker", &self.marker.position)
            .field("heading", &self.marker.heading)
            .field("roam", &self.roam)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::map::renderer::{DrawCall, RecordingRenderer};
    use crate::map::tile::{TileKey, TileLoader};
    use crate::map::math::size_for_level;

    struct SolidLoader;

    impl TileLoader for SolidLoader {
        fn load(&self, _key: TileKey) -> Result<TileImage> {
            Ok(TileImage::filled(256, 256, [0, 0, 255, 255]))
        }
    }

    fn controller(clock: &ManualClock) -> ViewportController {
        let mut chain = TileSourceChain::new();
        chain.push(TileCache::new("solid", Arc::new(SolidLoader), 64));
        let sprite = Arc::new(TileImage::filled(32, 32, [255, 0, 0, 255]));
        ViewportController::new(512, 512, chain, sprite, Box::new(clock.clone()))
    }

    /// Geographic position of world pixel (x, y) at `level`
    fn geo(x: u32, y: u32, level: u8) -> (f64, f64) {
        pixel_to_geo(x, y, level)
    }

    fn place(map: &mut ViewportController, x: u32, y: u32) -> bool {
        let (lat, lon) = geo(x, y, map.level());
        map.set_marker_position(lat, lon).unwrap()
    }

    /// Level 5, origin (1000, 1000), marker centred at (1256, 1256), following
    fn settled(clock: &ManualClock) -> ViewportController {
        let mut map = controller(clock);
        map.set_level(5).unwrap();
        map.set_viewport(1000, 1000, false);
        place(&mut map, 1256, 1256);
        assert_eq!(map.origin(), WorldPosition::new(1000, 1000));
        map
    }

    #[test]
    fn test_initial_state() {
        let clock = ManualClock::new();
        let map = controller(&clock);
        assert_eq!(map.level(), 0);
        assert_eq!(map.origin(), WorldPosition::new(0, 0));
        assert_eq!(map.roam_state(), RoamState::Following);
        assert!(map.is_dirty());
    }

    #[test]
    fn test_set_level_rejects_invalid() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);
        let before = (map.level(), map.origin(), map.marker().position);

        assert!(matches!(map.set_level(16), Err(MapError::InvalidZoomLevel(16))));
        assert_eq!((map.level(), map.origin(), map.marker().position), before);
    }

    #[test]
    fn test_set_level_same_is_noop() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);
        assert!(!map.set_level(5).unwrap());
        assert_eq!(map.origin(), WorldPosition::new(1000, 1000));
    }

    #[test]
    fn test_set_level_keeps_origin_place_while_roaming() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);
        map.manipulate_viewport(0, 0, false);

        map.set_level(6).unwrap();
        assert_eq!(map.level(), 6);
        assert!((map.origin().x as i64 - 2000).abs() <= 2);
        assert!((map.origin().y as i64 - 2000).abs() <= 2);
        assert!((map.marker().position.x as i64 - 2512).abs() <= 2);
        assert!((map.marker().position.y as i64 - 2512).abs() <= 2);

        map.set_level(5).unwrap();
        assert!((map.origin().x as i64 - 1000).abs() <= 1);
        assert!((map.marker().position.y as i64 - 1256).abs() <= 1);
    }

    #[test]
    fn test_zoom_in_while_following_recentres() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);

        // Doubling pushes the marker to the right edge of the old origin
        map.set_level(6).unwrap();
        let marker = map.marker().position;
        assert_eq!(map.origin().x as i64, marker.x as i64 - 256);
        assert_eq!(map.origin().y as i64, marker.y as i64 - 256);
    }

    #[test]
    fn test_set_viewport_clamps() {
        let clock = ManualClock::new();
        let mut map = controller(&clock);
        map.set_level(5).unwrap();

        assert!(map.set_viewport(-50, 99_999, false));
        assert_eq!(map.origin(), WorldPosition::new(0, 8192 - 512));
        assert!(!map.set_viewport(-1, 99_999, true));
    }

    #[test]
    fn test_world_smaller_than_viewport() {
        let clock = ManualClock::new();
        let mut map = controller(&clock);
        // Level 0 world is 256 px, the gauge 512 px
        assert!(!map.set_viewport(300, 300, false));
        assert_eq!(map.origin(), WorldPosition::new(0, 0));
    }

    #[test]
    fn test_sub_pixel_move_is_coalesced() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);
        let (lat, lon) = geo(1256, 1256, 5);
        // A hair south-east of the pixel corner is still the same pixel
        assert!(!map.set_marker_position(lat - 1e-9, lon + 1e-9).unwrap());
    }

    #[test]
    fn test_non_finite_position_rejected() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);
        let before = map.marker().position;
        assert!(matches!(
            map.set_marker_position(f64::NAN, 2.0),
            Err(MapError::GeometryOutOfRange { .. })
        ));
        assert!(map.set_marker_position(1.0, f64::INFINITY).is_err());
        assert_eq!(map.marker().position, before);
    }

    #[test]
    fn test_heading_clamped_and_deduplicated() {
        let clock = ManualClock::new();
        let mut map = controller(&clock);
        map.render(&mut RecordingRenderer::new(512, 512));

        assert!(map.set_marker_heading(90.0));
        assert!(map.is_dirty());
        assert!(!map.set_marker_heading(90.0));

        assert!(map.set_marker_heading(400.0));
        assert_eq!(map.marker().heading, 360.0);
        assert!(map.set_marker_heading(-5.0));
        assert_eq!(map.marker().heading, 0.0);
    }

    #[test]
    fn test_follow_ignores_moves_away_from_edges() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);

        for (x, y) in [(1300, 1250), (1100, 1400), (1485, 1256), (1027, 1027)] {
            place(&mut map, x, y);
            assert_eq!(map.origin(), WorldPosition::new(1000, 1000), "moved for ({}, {})", x, y);
        }
    }

    #[test]
    fn test_follow_recentres_near_edge() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);

        // Right edge of the sprite reaches 1511 >= 1000 + 512 - 10
        place(&mut map, 1495, 1256);
        assert_eq!(map.origin(), WorldPosition::new(1495 - 256, 1000));
    }

    #[test]
    fn test_follow_recentres_when_marker_leaves() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);

        place(&mut map, 4000, 3000);
        assert_eq!(map.origin(), WorldPosition::new(4000 - 256, 3000 - 256));
    }

    #[test]
    fn test_roaming_timeout() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);

        assert!(map.manipulate_viewport(100, 0, true));
        assert!(map.roam_state().is_roaming());
        assert_eq!(map.origin(), WorldPosition::new(1100, 1000));

        // Marker far away, but roaming: the view stays put
        clock.advance_ms(1999);
        place(&mut map, 1260, 1256);
        place(&mut map, 5000, 5000);
        place(&mut map, 1260, 1256);
        assert_eq!(map.origin(), WorldPosition::new(1100, 1000));
        assert!(map.roam_state().is_roaming());

        clock.advance_ms(1);
        place(&mut map, 1264, 1256);
        assert_eq!(map.roam_state(), RoamState::Following);
        // One recentre on the marker as it was when roaming ended
        assert_eq!(map.origin(), WorldPosition::new(1260 - 256, 1000));
    }

    #[test]
    fn test_manipulation_renews_timeout() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);

        map.manipulate_viewport(50, 0, false);
        clock.advance_ms(1500);
        map.manipulate_viewport(50, 0, false);
        clock.advance_ms(1500);
        place(&mut map, 1270, 1256);
        assert!(map.roam_state().is_roaming());
        assert_eq!(map.origin(), WorldPosition::new(1100, 1000));
    }

    #[test]
    fn test_center_on_marker() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);
        map.manipulate_viewport(300, 300, false);

        assert!(map.center_on_marker(false));
        assert_eq!(map.origin(), WorldPosition::new(1000, 1000));
        assert!(!map.center_on_marker(false));
    }

    #[test]
    fn test_update_and_render() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);
        let range = crate::map::compositor::visible_tiles(&map.viewport(), 5).unwrap();
        for (x, y) in range.iter() {
            map.chain.caches_mut()[0].insert(TileKey::new(5, x, y), TileImage::filled(256, 256, [0; 4]));
        }
        map.set_marker_heading(45.0);

        map.update(Duration::from_millis(16)).unwrap();
        assert_eq!(map.patches().len(), range.count());
        let marker = map.marker_patch().unwrap();
        assert_eq!(marker.dst, Rect::new(240, 240, 32, 32));

        let mut renderer = RecordingRenderer::new(512, 512);
        map.render(&mut renderer);
        assert_eq!(renderer.blits(), range.count());
        assert!(renderer.calls.contains(&DrawCall::BlitRotated {
            src: Rect::new(0, 0, 32, 32),
            angle: 45.0,
            dst: Rect::new(240, 240, 32, 32),
        }));
        assert_eq!(renderer.calls.last(), Some(&DrawCall::Outline));
        assert!(!map.is_dirty());
    }

    #[test]
    fn test_marker_off_screen_not_drawn() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);
        map.manipulate_viewport(3000, 3000, false);

        map.update(Duration::ZERO).unwrap();
        assert!(map.marker_patch().is_none());

        let mut renderer = RecordingRenderer::new(512, 512);
        map.render(&mut renderer);
        assert!(!renderer
            .calls
            .iter()
            .any(|call| matches!(call, DrawCall::BlitRotated { .. })));
    }

    #[test]
    fn test_patch_references_released_each_update() {
        let clock = ManualClock::new();
        let mut map = settled(&clock);
        let key = TileKey::new(5, 3, 3);
        map.chain.caches_mut()[0].insert(key, TileImage::filled(256, 256, [0; 4]));

        map.update(Duration::ZERO).unwrap();
        assert_eq!(map.chain.caches()[0].ref_count(&key), Some(1));

        // Tile (3, 3) covers 768..1024, scrolled out of view
        map.manipulate_viewport(1000, 1000, false);
        map.update(Duration::ZERO).unwrap();
        assert_eq!(map.chain.caches()[0].ref_count(&key), Some(0));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_set_viewport_always_in_bounds(
                level in 0u8..=15,
                x in -100_000i64..10_000_000,
                y in -100_000i64..10_000_000
            ) {
                let clock = ManualClock::new();
                let mut map = controller(&clock);
                map.set_level(level).unwrap();
                map.set_viewport(x, y, false);

                let size = size_for_level(level) as i64;
                let origin = map.origin();
                prop_assert!(origin.x as i64 <= (size - 512).max(0));
                prop_assert!(origin.y as i64 <= (size - 512).max(0));
            }
        }
    }
}

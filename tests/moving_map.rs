// tests/moving_map.rs
//! End-to-end: tiles on disk, config file, feed packets, frames

use image::{Rgba, RgbaImage};
use moving_map::{
    config::{FeedConfig, MapConfig, TileSourceConfig},
    map::{geometry::Rect, viewport::RoamState, RecordingRenderer, Renderer, ViewportController},
    session::MapSession,
    telemetry::{xplane::encode_rows, FlightData, XPlaneDecoder},
};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const PRIMARY: [u8; 4] = [200, 0, 0, 255];
const FALLBACK: [u8; 4] = [0, 0, 200, 255];

fn write_tile(root: &Path, level: u8, x: u32, y: u32, rgba: [u8; 4]) {
    let dir = root.join(level.to_string()).join(x.to_string());
    std::fs::create_dir_all(&dir).unwrap();
    RgbaImage::from_pixel(256, 256, Rgba(rgba))
        .save(dir.join(format!("{}.png", y)))
        .unwrap();
}

/// Level 3, marker at (0, 0): world pixel (1024, 1024), view origin (768, 768),
/// tiles 3..=4 on both axes. The primary source only has tile (3, 3).
fn fixture(dir: &TempDir) -> MapConfig {
    let primary = dir.path().join("aip");
    let fallback = dir.path().join("osm");
    write_tile(&primary, 3, 3, 3, PRIMARY);
    for x in 3..=4 {
        for y in 3..=4 {
            write_tile(&fallback, 3, x, y, FALLBACK);
        }
    }

    let sprite = dir.path().join("plane.png");
    RgbaImage::from_pixel(32, 32, Rgba([255, 255, 255, 255]))
        .save(&sprite)
        .unwrap();

    MapConfig {
        width: 512,
        height: 512,
        initial_level: 3,
        initial_position: moving_map::map::GeoPosition::new(0.0, 0.0),
        tile_sources: vec![
            TileSourceConfig::new("aip", primary, "png"),
            TileSourceConfig::new("osm", fallback, "png"),
        ],
        marker_sprite: sprite,
        feed: FeedConfig::None,
        frame_interval_ms: 20,
        cache_capacity: None,
        max_concurrent_loads: 2,
    }
}

fn patch_color(map: &ViewportController, dst: Rect) -> Option<[u8; 4]> {
    map.patches()
        .iter()
        .find(|patch| patch.dst == dst)
        .map(|patch| patch.image.pixels().get_pixel(0, 0).0)
}

fn settle(map: &mut ViewportController, done: impl Fn(&ViewportController) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        map.update(Duration::from_millis(20)).unwrap();
        if done(map) {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("frame never settled: {} patches", map.patches().len());
}

#[test]
fn test_frame_from_disk_with_fallback() {
    let dir = TempDir::new().unwrap();
    let config = fixture(&dir);
    let mut map = ViewportController::from_config(&config).unwrap();

    assert_eq!(map.level(), 3);
    assert_eq!(map.marker().position.x, 1024);
    assert_eq!(map.origin().x, 768);
    assert_eq!(map.roam_state(), RoamState::Following);

    settle(&mut map, |map| {
        map.patches().len() == 4 && patch_color(map, Rect::new(0, 0, 256, 256)) == Some(PRIMARY)
    });
    assert_eq!(patch_color(&map, Rect::new(256, 0, 256, 256)), Some(FALLBACK));
    assert_eq!(patch_color(&map, Rect::new(256, 256, 256, 256)), Some(FALLBACK));

    let marker = map.marker_patch().unwrap();
    assert_eq!(marker.dst, Rect::new(240, 240, 32, 32));

    let mut renderer = RecordingRenderer::new(512, 512);
    map.render(&mut renderer);
    assert_eq!(renderer.blits(), 4);
    assert_eq!(renderer.width(), 512);

    let stats = map.chain_stats();
    assert_eq!(stats.sources[0].0, "aip");
    assert!(stats.sources[1].1.entries >= 3);
    // Nothing was decoded yet on the first frame
    assert!(stats.unavailable >= 4);
}

#[test]
fn test_missing_sprite_uses_placeholder() {
    let dir = TempDir::new().unwrap();
    let mut config = fixture(&dir);
    config.marker_sprite = dir.path().join("nope.png");

    let map = ViewportController::from_config(&config).unwrap();
    assert_eq!(map.marker().world_box().w, 32);
}

#[test]
fn test_invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = fixture(&dir);
    config.initial_level = 20;
    assert!(ViewportController::from_config(&config).is_err());
}

#[test]
fn test_config_file_drives_session() {
    let dir = TempDir::new().unwrap();
    let config = fixture(&dir);
    let path = dir.path().join("config.json");
    config.save_to(&path).unwrap();

    let loaded = MapConfig::load_from(&path).unwrap();
    let mut session = MapSession::new(&loaded).unwrap();

    // Simulator reports a position a few pixels east, heading west
    let packet = encode_rows(&[
        (20, [0.0, 0.5, 3500.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        (17, [0.0, 0.0, 0.0, 270.0, 0.0, 0.0, 0.0, 0.0]),
    ]);
    let mut data = FlightData::new();
    XPlaneDecoder::new().decode(&packet, &mut data).unwrap();
    let update = data.feed_update().unwrap();

    assert!(session.apply(update).unwrap());
    let map = session.map();
    assert_eq!(map.marker().heading, 270.0);
    assert!(map.marker().position.x > 1024);
    // Still well inside the view, so no recentre
    assert_eq!(map.origin().x, 768);

    let mut renderer = RecordingRenderer::new(512, 512);
    assert!(session.frame(&mut renderer));
}

mod in_memory {
    use super::*;
    use moving_map::clock::ManualClock;
    use moving_map::error::Result;
    use moving_map::map::{
        math::pixel_to_geo, TileCache, TileImage, TileKey, TileLoader, TileSourceChain,
        WorldPosition,
    };
    use std::sync::Arc;

    struct CheckerLoader;

    impl TileLoader for CheckerLoader {
        fn load(&self, key: TileKey) -> Result<TileImage> {
            let shade = if (key.x + key.y) % 2 == 0 { 40 } else { 220 };
            Ok(TileImage::filled(256, 256, [shade, shade, shade, 255]))
        }
    }

    fn controller(clock: &ManualClock) -> ViewportController {
        let mut chain = TileSourceChain::new();
        chain.push(TileCache::new(
            "checker",
            Arc::new(CheckerLoader),
            TileCache::capacity_for_viewport(512, 512),
        ));
        let sprite = Arc::new(TileImage::filled(32, 32, [255, 0, 0, 255]));
        let mut map = ViewportController::new(512, 512, chain, sprite, Box::new(clock.clone()));
        map.set_level(6).unwrap();
        map
    }

    fn fly_to(map: &mut ViewportController, x: u32, y: u32) {
        let (lat, lon) = pixel_to_geo(x, y, map.level());
        map.set_marker_position(lat, lon).unwrap();
    }

    #[test]
    fn test_flight_with_manual_scroll() {
        let clock = ManualClock::new();
        let mut map = controller(&clock);

        fly_to(&mut map, 5000, 5000);
        assert_eq!(map.origin(), WorldPosition::new(4744, 4744));

        // Cruise east: the view only jumps when the marker nears the right edge
        let mut jumps = 0;
        let mut origin = map.origin();
        for x in (5000..6000).step_by(20) {
            fly_to(&mut map, x, 5000);
            if map.origin() != origin {
                jumps += 1;
                origin = map.origin();
            }
        }
        assert_eq!(jumps, 4);
        assert_eq!(map.origin(), WorldPosition::new(5960 - 256, 4744));

        // Pilot scrolls away; the aircraft keeps moving without pulling the view back
        map.manipulate_viewport(-2000, 0, false);
        let scrolled = map.origin();
        for step in 0..10 {
            clock.advance_ms(150);
            fly_to(&mut map, 6000 + step * 10, 5000);
        }
        assert_eq!(map.origin(), scrolled);
        assert!(map.roam_state().is_roaming());

        clock.advance_ms(2000);
        fly_to(&mut map, 6200, 5000);
        assert_eq!(map.roam_state(), RoamState::Following);
        assert_eq!(map.origin().y, 5000 - 256);

        settle(&mut map, |map| map.patches().len() == 9);
        let mut renderer = RecordingRenderer::new(512, 512);
        map.render(&mut renderer);
        assert_eq!(renderer.blits(), 9);
        assert!(map.marker_patch().is_some());
    }
}

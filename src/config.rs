// src/config.rs
//! Configuration management with platform-specific storage

use crate::error::{MapError, Result};
use crate::map::math::{GeoPosition, MAX_LEVEL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

const APP_DIR: &str = "moving-map";
const CONFIG_FILE: &str = "config.json";

/// One imagery directory laid out as `<path>/<level>/<x>/<y>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSourceConfig {
    pub name: String,
    pub path: PathBuf,
    pub extension: String,
}

impl TileSourceConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            extension: extension.into(),
        }
    }
}

/// Where position and heading updates come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedConfig {
    /// Simulator UDP data output
    XPlane { port: u16 },
    /// NMEA receiver on a serial line
    Serial { port: String, baudrate: u32 },
    /// No feed; the map stays where it was put
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Gauge size in pixels
    pub width: u32,
    pub height: u32,
    pub initial_level: u8,
    pub initial_position: GeoPosition,
    /// Highest priority first
    pub tile_sources: Vec<TileSourceConfig>,
    pub marker_sprite: PathBuf,
    pub feed: FeedConfig,
    pub frame_interval_ms: u64,
    /// Per-source cache capacity; derived from the gauge size when unset
    pub cache_capacity: Option<usize>,
    pub max_concurrent_loads: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl MapConfig {
    /// Defaults rooted in the platform data directory
    pub fn platform_default() -> Self {
        let data = Self::data_dir();
        let maps = data.join("maps");

        Self {
            width: 512,
            height: 512,
            initial_level: 10,
            // Toussus-le-Noble
            initial_position: GeoPosition::new(48.7519, 2.1061),
            tile_sources: vec![
                TileSourceConfig::new("osm-aip", maps.join("osm-aip"), "png"),
                TileSourceConfig::new("osm", maps.join("osm"), "png"),
            ],
            marker_sprite: data.join("images").join("plane32.png"),
            feed: FeedConfig::XPlane { port: 49000 },
            frame_interval_ms: 50,
            cache_capacity: None,
            max_concurrent_loads: 4,
        }
    }

    /// Load from the default location, falling back to defaults if there is no file yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::platform_default());
        }
        Self::load_from(&path)
    }

    /// Like [`MapConfig::load`], but a broken file is reported and replaced by defaults.
    pub fn load_or_default() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_or_default_from(&path),
            Err(e) => {
                warn!(error = %e, "no config location, using defaults");
                Self::platform_default()
            }
        }
    }

    pub fn load_or_default_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::platform_default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unusable config, using defaults");
                Self::platform_default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MapError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| MapError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MapError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| MapError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MapError::Config(format!(
                "gauge size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.initial_level > MAX_LEVEL {
            return Err(MapError::InvalidZoomLevel(self.initial_level));
        }
        if !self.initial_position.is_finite() {
            return Err(MapError::GeometryOutOfRange {
                latitude: self.initial_position.latitude,
                longitude: self.initial_position.longitude,
            });
        }
        if self.frame_interval_ms == 0 {
            return Err(MapError::Config("frame interval must be non-zero".to_string()));
        }
        if self.max_concurrent_loads == 0 {
            return Err(MapError::Config(
                "max_concurrent_loads must be at least 1".to_string(),
            ));
        }
        if self.tile_sources.is_empty() {
            return Err(MapError::Config("no tile sources configured".to_string()));
        }
        if let Some(source) = self.tile_sources.iter().find(|s| s.extension.is_empty()) {
            return Err(MapError::Config(format!(
                "tile source '{}' has no file extension",
                source.name
            )));
        }
        Ok(())
    }

    /// Config file path, e.g. `~/.config/moving-map/config.json`
    pub fn config_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| MapError::Config("no configuration directory on this platform".to_string()))?;
        Ok(base.join(APP_DIR).join(CONFIG_FILE))
    }

    fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Switch to the simulator feed
    pub fn update_xplane(&mut self, port: u16) {
        self.feed = FeedConfig::XPlane { port };
    }

    /// Switch to a serial NMEA feed
    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.feed = FeedConfig::Serial { port, baudrate };
    }
}

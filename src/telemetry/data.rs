// src/telemetry/data.rs
//! Flight data structures and utilities

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Attitude {
    pub pitch: f32,
    pub roll: f32,
    /// Degrees true
    pub heading: f32,
    pub sideslip: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Feet MSL
    pub altitude: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Airspeed {
    pub indicated: f32,
    pub true_airspeed: f32,
    pub groundspeed: f32,
    /// Feet per minute
    pub vertical: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Engine {
    pub rpm: f32,
    pub manifold_pressure: f32,
    pub fuel_flow: f32,
    pub egt: f32,
    pub cht: f32,
    pub oil_pressure: f32,
    pub oil_temperature: f32,
    pub fuel_pressure: f32,
    pub battery_volts: f32,
    pub fuel_quantity: [f32; 4],
}

impl Engine {
    /// Left plus right main tanks
    pub fn main_tanks(&self) -> f32 {
        self.fuel_quantity[0] + self.fuel_quantity[1]
    }
}

/// Everything the feed has told us so far. Fields keep their last value until a
/// newer packet or sentence overwrites them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlightData {
    pub timestamp: Option<DateTime<Utc>>,
    pub attitude: Attitude,
    pub position: Position,
    pub airspeed: Airspeed,
    pub engine: Engine,
    pub has_fix: bool,
    pub source: Option<String>,
}

/// What the moving map needs out of a feed packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedUpdate {
    pub latitude: f64,
    pub longitude: f64,
    /// Degrees
    pub heading: f32,
}

impl FlightData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position and heading for the map, once a fix has been seen
    pub fn feed_update(&self) -> Option<FeedUpdate> {
        if !self.has_fix {
            return None;
        }
        Some(FeedUpdate {
            latitude: self.position.latitude,
            longitude: self.position.longitude,
            heading: self.attitude.heading,
        })
    }

    /// Get the age of the data in seconds
    pub fn age_seconds(&self) -> Option<i64> {
        self.timestamp
            .map(|ts| Utc::now().signed_duration_since(ts).num_seconds())
    }

    /// Check if the data is recent (within 10 seconds)
    pub fn is_recent(&self) -> bool {
        self.age_seconds().map_or(false, |age| age < 10)
    }

    pub fn update_timestamp(&mut self) {
        self.timestamp = Some(Utc::now());
    }

    pub fn set_source(&mut self, source: &str) {
        self.source = Some(source.to_string());
    }

    /// Format coordinate for display
    pub fn format_coordinate(coord: f64) -> String {
        format!("{:>12.6}°", coord)
    }
}

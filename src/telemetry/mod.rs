// src/telemetry/mod.rs
//! Position and flight data feeds driving the map

pub mod data;
pub mod nmea;
pub mod receiver;
pub mod xplane;

pub use data::{FeedUpdate, FlightData};
pub use xplane::XPlaneDecoder;

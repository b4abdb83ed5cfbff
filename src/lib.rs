// src/lib.rs
//! Moving Map Library
//!
//! The moving-map gauge of a flight display: a slippy map of pre-rendered Web Mercator
//! tiles scrolled under an aircraft marker, fed by a simulator or a GPS receiver.

pub mod clock;
pub mod config;
pub mod display;
pub mod error;
pub mod logging;
pub mod map;
pub mod session;
pub mod telemetry;

// Re-export main types for convenience
pub use config::{FeedConfig, MapConfig, TileSourceConfig};
pub use error::{MapError, Result};
pub use map::{Renderer, TileSourceChain, ViewportController};
pub use session::MapSession;
pub use telemetry::{FeedUpdate, FlightData};

// src/display/mod.rs
//! Display backends for the map

pub mod terminal;

pub use terminal::{MapStatus, TerminalRenderer};

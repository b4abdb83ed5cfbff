// src/telemetry/xplane.rs
//! X-Plane UDP "DATA" output decoding
//!
//! A packet is the four bytes `DATA`, one index byte, then any number of 36-byte rows:
//! a little-endian `i32` row id followed by eight little-endian `f32` values. Which
//! values matter depends on the row id.

use super::data::FlightData;
use crate::error::{MapError, Result};
use std::collections::HashMap;
use tracing::{debug, trace};

pub const HEADER: &[u8; 4] = b"DATA";
pub const HEADER_LEN: usize = 5;
pub const ROW_LEN: usize = 36;
pub const VALUES_PER_ROW: usize = 8;

/// Default port the simulator sends to
pub const DEFAULT_PORT: u16 = 49000;

type RowParser = fn(&mut FlightData, &[f32; VALUES_PER_ROW]);

fn parse_airspeeds(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.airspeed.indicated = v[0];
    data.airspeed.true_airspeed = v[2];
    data.airspeed.groundspeed = v[3];
}

fn parse_vertical_speed(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.airspeed.vertical = v[2];
}

fn parse_attitude(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.attitude.pitch = v[0];
    data.attitude.roll = v[1];
    data.attitude.heading = v[3];
}

fn parse_sideslip(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.attitude.sideslip = v[7];
}

fn parse_position(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.position.latitude = v[0] as f64;
    data.position.longitude = v[1] as f64;
    data.position.altitude = v[2] as f64;
    data.has_fix = true;
}

fn parse_rpm(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.engine.rpm = v[0];
}

fn parse_manifold_pressure(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.engine.manifold_pressure = v[0];
}

fn parse_fuel_flow(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.engine.fuel_flow = v[0];
}

fn parse_egt(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.engine.egt = v[0];
}

fn parse_cht(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.engine.cht = v[0];
}

fn parse_oil_pressure(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.engine.oil_pressure = v[0];
}

fn parse_oil_temperature(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.engine.oil_temperature = v[0];
}

fn parse_fuel_pressure(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.engine.fuel_pressure = v[0];
}

fn parse_battery_volts(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.engine.battery_volts = v[0];
}

fn parse_fuel_quantity(data: &mut FlightData, v: &[f32; VALUES_PER_ROW]) {
    data.engine.fuel_quantity.copy_from_slice(&v[..4]);
}

/// Stateless apart from its row table; one decoder can serve any number of packets.
pub struct XPlaneDecoder {
    parsers: HashMap<i32, RowParser>,
}

impl Default for XPlaneDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl XPlaneDecoder {
    pub fn new() -> Self {
        let table: [(i32, RowParser); 15] = [
            (3, parse_airspeeds),
            (4, parse_vertical_speed),
            (17, parse_attitude),
            (18, parse_sideslip),
            (20, parse_position),
            (37, parse_rpm),
            (43, parse_manifold_pressure),
            (45, parse_fuel_flow),
            (47, parse_egt),
            (48, parse_cht),
            (49, parse_oil_pressure),
            (50, parse_oil_temperature),
            (51, parse_fuel_pressure),
            (54, parse_battery_volts),
            (62, parse_fuel_quantity),
        ];
        Self {
            parsers: table.into_iter().collect(),
        }
    }

    pub fn supports(&self, row_id: i32) -> bool {
        self.parsers.contains_key(&row_id)
    }

    /// Apply every known row of `packet` to `data`. Returns the number of rows applied.
    ///
    /// Unknown rows are skipped, a partial trailing row is ignored.
    pub fn decode(&self, packet: &[u8], data: &mut FlightData) -> Result<usize> {
        if packet.len() < HEADER_LEN || &packet[..HEADER.len()] != HEADER {
            return Err(MapError::Parse("not an X-Plane DATA packet".to_string()));
        }

        let body = &packet[HEADER_LEN..];
        let mut applied = 0;
        for row in body.chunks_exact(ROW_LEN) {
            let (row_id, values) = split_row(row);
            match self.parsers.get(&row_id) {
                Some(parser) => {
                    parser(data, &values);
                    applied += 1;
                }
                None => debug!(row_id, "unsupported X-Plane row"),
            }
        }

        let trailing = body.len() % ROW_LEN;
        if trailing != 0 {
            trace!(trailing, "ignoring partial row");
        }

        data.update_timestamp();
        Ok(applied)
    }
}

fn split_row(row: &[u8]) -> (i32, [f32; VALUES_PER_ROW]) {
    let mut word = [0u8; 4];
    word.copy_from_slice(&row[..4]);
    let row_id = i32::from_le_bytes(word);

    let mut values = [0f32; VALUES_PER_ROW];
    for (value, bytes) in values.iter_mut().zip(row[4..].chunks_exact(4)) {
        word.copy_from_slice(bytes);
        *value = f32::from_le_bytes(word);
    }
    (row_id, values)
}

/// Build a DATA packet, the way the simulator lays it out.
pub fn encode_rows(rows: &[(i32, [f32; VALUES_PER_ROW])]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_LEN + rows.len() * ROW_LEN);
    packet.extend_from_slice(HEADER);
    packet.push(b'*');
    for (row_id, values) in rows {
        packet.extend_from_slice(&row_id.to_le_bytes());
        for value in values {
            packet.extend_from_slice(&value.to_le_bytes());
        }
    }
    packet
}

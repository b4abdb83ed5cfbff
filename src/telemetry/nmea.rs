// src/telemetry/nmea.rs
//! NMEA sentence parsing for serial GPS receivers

use super::data::FlightData;

const FEET_PER_METER: f64 = 3.28084;

/// Parse a single NMEA sentence and update flight data.
///
/// Returns true if the sentence carried a usable position.
pub fn parse_nmea_sentence(data: &mut FlightData, line: &str) -> bool {
    let line = line.trim();
    if !checksum_ok(line) {
        return false;
    }
    let parts: Vec<&str> = line.split('*').next().unwrap_or(line).split(',').collect();

    let updated = if line.starts_with("$GPGGA") || line.starts_with("$GNGGA") {
        parse_gga(data, &parts)
    } else if line.starts_with("$GPRMC") || line.starts_with("$GNRMC") {
        parse_rmc(data, &parts)
    } else {
        false
    };

    if updated {
        data.update_timestamp();
    }
    updated
}

/// Sentences without a checksum are accepted as-is
fn checksum_ok(line: &str) -> bool {
    let Some(body) = line.strip_prefix('$') else {
        return false;
    };
    let Some((payload, checksum)) = body.split_once('*') else {
        return true;
    };
    let computed = payload.bytes().fold(0u8, |acc, b| acc ^ b);
    u8::from_str_radix(checksum.trim(), 16).map_or(false, |expected| expected == computed)
}

/// `ddmm.mmmm` + hemisphere to signed degrees
fn parse_coordinate(value: &str, hemisphere: &str, negative: &str) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }
    let raw = value.parse::<f64>().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let coordinate = degrees + minutes / 60.0;
    Some(if hemisphere == negative { -coordinate } else { coordinate })
}

/// GGA (Global Positioning System Fix Data)
fn parse_gga(data: &mut FlightData, parts: &[&str]) -> bool {
    if parts.len() < 10 {
        return false;
    }

    // Fix quality (field 6), 0 means no fix
    let quality = parts[6].parse::<u8>().unwrap_or(0);
    if quality == 0 {
        return false;
    }

    let (Some(latitude), Some(longitude)) = (
        parse_coordinate(parts[2], parts[3], "S"),
        parse_coordinate(parts[4], parts[5], "W"),
    ) else {
        return false;
    };

    data.position.latitude = latitude;
    data.position.longitude = longitude;
    if let Ok(altitude) = parts[9].parse::<f64>() {
        data.position.altitude = altitude * FEET_PER_METER;
    }
    data.has_fix = true;
    true
}

/// RMC (Recommended Minimum Course)
fn parse_rmc(data: &mut FlightData, parts: &[&str]) -> bool {
    if parts.len() < 9 || parts[2] != "A" {
        return false;
    }

    let (Some(latitude), Some(longitude)) = (
        parse_coordinate(parts[3], parts[4], "S"),
        parse_coordinate(parts[5], parts[6], "W"),
    ) else {
        return false;
    };
    data.position.latitude = latitude;
    data.position.longitude = longitude;

    // Speed over ground in knots (field 7)
    if let Ok(speed) = parts[7].parse::<f32>() {
        data.airspeed.groundspeed = speed;
    }
    // Track made good stands in for heading on a GPS-only feed
    if let Ok(course) = parts[8].parse::<f32>() {
        data.attitude.heading = course;
    }
    data.has_fix = true;
    true
}

// src/telemetry/receiver.rs
//! Background feed listeners
//!
//! Each listener owns its socket or port and its own [`FlightData`], and forwards a
//! [`FeedUpdate`] for every packet or sentence that carries a fix. Listeners stop when
//! the running flag drops or the receiving side of the channel goes away.

use super::data::{FeedUpdate, FlightData};
use super::nmea;
use super::xplane::XPlaneDecoder;
use crate::config::FeedConfig;
use crate::error::{MapError, Result};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// How often an idle listener looks at the running flag
const POLL_INTERVAL: Duration = Duration::from_millis(500);

const BUFFER_SIZE: usize = 1024;

/// Start the listener described by `config`. `None` when the feed is disabled.
pub async fn spawn_feed(
    config: &FeedConfig,
    tx: mpsc::Sender<FeedUpdate>,
    running: Arc<AtomicBool>,
) -> Result<Option<JoinHandle<()>>> {
    match config {
        FeedConfig::XPlane { port } => spawn_xplane_listener(*port, tx, running).await.map(Some),
        FeedConfig::Serial { port, baudrate } => {
            spawn_serial_listener(port, *baudrate, tx, running).map(Some)
        }
        FeedConfig::None => {
            info!("no feed configured");
            Ok(None)
        }
    }
}

/// Listen for simulator DATA packets on every interface.
pub async fn spawn_xplane_listener(
    port: u16,
    tx: mpsc::Sender<FeedUpdate>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let socket = bind_udp(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    Ok(spawn_xplane_on(socket, tx, running))
}

pub async fn bind_udp(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|e| MapError::Connection(format!("Failed to bind UDP {}: {}", addr, e)))?;
    info!(addr = %socket.local_addr()?, "listening for X-Plane data");
    Ok(socket)
}

/// Run the DATA decoder over an already bound socket.
pub fn spawn_xplane_on(
    socket: UdpSocket,
    tx: mpsc::Sender<FeedUpdate>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let decoder = XPlaneDecoder::new();
        let mut data = FlightData::new();
        data.set_source("X-Plane");
        let mut buffer = [0u8; BUFFER_SIZE];

        while running.load(Ordering::Relaxed) {
            let received = match tokio::time::timeout(POLL_INTERVAL, socket.recv_from(&mut buffer)).await {
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!(error = %e, "UDP receive failed");
                    continue;
                }
                Ok(Ok((len, _from))) => len,
            };

            if let Err(e) = decoder.decode(&buffer[..received], &mut data) {
                debug!(error = %e, bytes = received, "dropping packet");
                continue;
            }
            if let Some(update) = data.feed_update() {
                if tx.send(update).await.is_err() {
                    break;
                }
            }
        }
        debug!("X-Plane listener stopped");
    })
}

/// Read NMEA sentences from a serial GPS receiver.
pub fn spawn_serial_listener(
    port: &str,
    baudrate: u32,
    tx: mpsc::Sender<FeedUpdate>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let serial = tokio_serial::new(port, baudrate)
        .timeout(Duration::from_millis(1000))
        .open_native_async()
        .map_err(|e| MapError::Connection(format!("Failed to open serial port {}: {}", port, e)))?;
    info!(port, baudrate, "connected to serial GPS");

    Ok(tokio::spawn(async move {
        let mut reader = BufReader::new(serial);
        let mut data = FlightData::new();
        data.set_source("Serial GPS");
        let mut line = String::new();

        while running.load(Ordering::Relaxed) {
            line.clear();
            match tokio::time::timeout(POLL_INTERVAL, reader.read_line(&mut line)).await {
                Err(_) => continue,
                Ok(Ok(0)) => break, // EOF
                Ok(Ok(_)) => {
                    if !nmea::parse_nmea_sentence(&mut data, &line) {
                        continue;
                    }
                    if let Some(update) = data.feed_update() {
                        if tx.send(update).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "error reading from serial port");
                    break;
                }
            }
        }
        debug!("serial listener stopped");
    }))
}

/// Names of the serial ports on this machine
pub fn list_serial_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| MapError::Other(format!("Failed to list serial ports: {}", e)))?;
    Ok(ports
        .into_iter()
        .map(|port| format!("{} - {:?}", port.port_name, port.port_type))
        .collect())
}

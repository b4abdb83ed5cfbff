// src/main.rs
//! Moving Map - terminal moving-map gauge driven by X-Plane or a serial GPS

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use moving_map::{
    config::{FeedConfig, MapConfig},
    display::TerminalRenderer,
    logging::{init_logging, LogOptions},
    map::math::{degrees_per_pixel, geo_to_pixel, pixel_to_tile},
    session::MapSession,
    telemetry::{receiver, FlightData, XPlaneDecoder},
};
use std::{
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, Arc},
};
use tokio::sync::mpsc;

const FEED_QUEUE: usize = 64;

#[derive(Parser)]
#[command(name = "moving-map", version, about = "Moving map gauge")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the live map
    Run {
        /// Configuration file (defaults to the per-user config)
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long)]
        level: Option<u8>,
        /// Listen for X-Plane data on this UDP port
        #[arg(long, conflicts_with = "serial")]
        xplane_port: Option<u16>,
        /// Read NMEA from this serial port
        #[arg(long)]
        serial: Option<String>,
        #[arg(long, default_value_t = 9600)]
        baud: u32,
        /// Write logs here instead of stderr
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Print world pixel and tile for a position
    Project {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long)]
        level: u8,
    },
    /// Decode a captured X-Plane DATA packet
    Decode { file: PathBuf },
    /// List available serial ports
    ListPorts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            width,
            height,
            level,
            xplane_port,
            serial,
            baud,
            log_file,
        } => {
            let _guard = init_logging(&LogOptions {
                file: log_file,
                ..LogOptions::default()
            })?;

            let mut config = match config {
                Some(path) => MapConfig::load_from(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => MapConfig::load_or_default(),
            };
            if let Some(width) = width {
                config.width = width;
            }
            if let Some(height) = height {
                config.height = height;
            }
            if let Some(level) = level {
                config.initial_level = level;
            }
            if let Some(port) = xplane_port {
                config.update_xplane(port);
            }
            if let Some(port) = serial {
                config.update_serial(port, baud);
            }
            run(config).await
        }
        Command::Project { lat, lon, level } => project(lat, lon, level),
        Command::Decode { file } => decode(&file),
        Command::ListPorts => list_ports(),
    }
}

async fn run(config: MapConfig) -> anyhow::Result<()> {
    let mut session = MapSession::new(&config)?;
    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel(FEED_QUEUE);

    let listener = receiver::spawn_feed(&config.feed, tx, Arc::clone(&running)).await?;
    if config.feed == FeedConfig::None {
        eprintln!("No feed configured; the map will not move.");
    }

    let mut renderer = TerminalRenderer::new(config.width, config.height);
    session.run(&mut renderer, rx, running).await?;

    if let Some(listener) = listener {
        let _ = listener.await;
    }
    println!("\nShutting down...");
    Ok(())
}

fn project(lat: f64, lon: f64, level: u8) -> anyhow::Result<()> {
    if level > moving_map::map::math::MAX_LEVEL {
        bail!("level must be between 0 and {}", moving_map::map::math::MAX_LEVEL);
    }
    let (px, py) = geo_to_pixel(lat, lon, level);
    let (tx, ty) = pixel_to_tile(px, py);
    println!("Position:    {:.6}, {:.6}", lat, lon);
    println!("Level:       {}", level);
    println!("World pixel: {}, {}", px, py);
    println!("Tile:        {}/{}/{}", level, tx, ty);
    println!("Resolution:  {:.8} deg/px", degrees_per_pixel(level));
    Ok(())
}

fn decode(file: &Path) -> anyhow::Result<()> {
    let packet = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let mut data = FlightData::new();
    let rows = XPlaneDecoder::new().decode(&packet, &mut data)?;
    eprintln!("{} rows decoded", rows);
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn list_ports() -> anyhow::Result<()> {
    let ports = receiver::list_serial_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Available serial ports:");
        for port in ports {
            println!("  {}", port);
        }
    }
    Ok(())
}

// src/display/terminal.rs
//! Terminal-based map display
//!
//! Draws a coarse character picture of the frame (one cell per block of pixels, `#`
//! where imagery landed, an arrow for the marker) under a status panel.

use crate::map::{
    geometry::Rect, renderer::Renderer, source_chain::ChainStats, tile::TileImage,
    viewport::{RoamState, ViewportController},
    GeoPosition, WorldPosition,
};
use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::io::{self, Stdout, Write};
use tracing::warn;

const GRID_COLUMNS: usize = 48;
const GRID_ROWS: usize = 20;

/// Controller state shown next to the picture
#[derive(Debug, Clone, Default)]
pub struct MapStatus {
    pub level: u8,
    pub origin: WorldPosition,
    pub marker: GeoPosition,
    pub heading: f32,
    pub roaming: bool,
    pub stats: ChainStats,
}

impl MapStatus {
    pub fn from_controller(map: &ViewportController) -> Self {
        Self {
            level: map.level(),
            origin: map.origin(),
            marker: map.marker_geo(),
            heading: map.marker().heading,
            roaming: matches!(map.roam_state(), RoamState::Roaming { .. }),
            stats: map.chain_stats(),
        }
    }
}

pub struct TerminalRenderer<W: Write = Stdout> {
    out: W,
    width: u32,
    height: u32,
    clear_screen: bool,
    grid: Vec<Vec<char>>,
    blits: usize,
    status: MapStatus,
}

impl TerminalRenderer<Stdout> {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_writer(io::stdout(), width, height, true)
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn with_writer(out: W, width: u32, height: u32, clear_screen: bool) -> Self {
        Self {
            out,
            width,
            height,
            clear_screen,
            grid: vec![vec![' '; GRID_COLUMNS]; GRID_ROWS],
            blits: 0,
            status: MapStatus::default(),
        }
    }

    pub fn set_status(&mut self, status: MapStatus) {
        self.status = status;
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Grid cells touched by a gauge-local rectangle
    fn cells(&self, dst: Rect) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let to_col = |x: i64| {
            ((x.max(0) as usize) * GRID_COLUMNS / self.width.max(1) as usize).min(GRID_COLUMNS)
        };
        let to_row = |y: i64| {
            ((y.max(0) as usize) * GRID_ROWS / self.height.max(1) as usize).min(GRID_ROWS)
        };
        let columns = to_col(dst.x)..to_col(dst.right()).max(to_col(dst.x) + 1).min(GRID_COLUMNS);
        let rows = to_row(dst.y)..to_row(dst.bottom()).max(to_row(dst.y) + 1).min(GRID_ROWS);
        (columns, rows)
    }

    fn mark(&mut self, dst: Rect, glyph: char) {
        let (columns, rows) = self.cells(dst);
        for row in rows {
            for column in columns.clone() {
                self.grid[row][column] = glyph;
            }
        }
    }

    fn write_frame(&mut self) -> io::Result<()> {
        if self.clear_screen {
            queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        }

        let status = &self.status;
        queue!(
            self.out,
            SetForegroundColor(Color::Green),
            Print("=".repeat(GRID_COLUMNS + 2)),
            Print("\n"),
            Print("Moving Map"),
            Print("\n"),
            ResetColor
        )?;

        queue!(
            self.out,
            SetForegroundColor(Color::Yellow),
            Print("POSITION:\n"),
            ResetColor,
            Print(format!(
                "  Latitude:  {}\n",
                crate::telemetry::FlightData::format_coordinate(status.marker.latitude)
            )),
            Print(format!(
                "  Longitude: {}\n",
                crate::telemetry::FlightData::format_coordinate(status.marker.longitude)
            )),
            Print(format!("  Heading:   {:>12.1}°\n", status.heading)),
        )?;

        let mode = if status.roaming { "roaming" } else { "following" };
        queue!(
            self.out,
            SetForegroundColor(Color::Cyan),
            Print("VIEW:\n"),
            ResetColor,
            Print(format!("  Level:     {:>12}\n", status.level)),
            Print(format!(
                "  Origin:    {:>12}\n",
                format!("{},{}", status.origin.x, status.origin.y)
            )),
            Print(format!("  Mode:      {:>12}\n", mode)),
            Print(format!("  Patches:   {:>12}\n", self.blits)),
        )?;

        queue!(self.out, SetForegroundColor(Color::Magenta), Print("TILES:\n"), ResetColor)?;
        for (name, stats) in &status.stats.sources {
            queue!(
                self.out,
                Print(format!(
                    "  {:<10} {:>3}/{:<3} hit {} miss {} loading {}\n",
                    name, stats.entries, stats.capacity, stats.hits, stats.misses, stats.in_flight
                ))
            )?;
        }
        queue!(
            self.out,
            Print(format!("  Unavailable: {}\n", status.stats.unavailable))
        )?;

        queue!(self.out, Print(format!("+{}+\n", "-".repeat(GRID_COLUMNS))))?;
        for row in &self.grid {
            let line: String = row.iter().collect();
            queue!(self.out, Print(format!("|{}|\n", line)))?;
        }
        queue!(self.out, Print(format!("+{}+\n", "-".repeat(GRID_COLUMNS))))?;

        self.out.flush()
    }

    fn reset(&mut self) {
        for row in self.grid.iter_mut() {
            row.fill(' ');
        }
        self.blits = 0;
    }
}

/// Eight-point arrow for a heading in degrees
fn heading_glyph(heading: f32) -> char {
    const ARROWS: [char; 8] = ['↑', '↗', '→', '↘', '↓', '↙', '←', '↖'];
    let sector = ((heading.rem_euclid(360.0) + 22.5) / 45.0) as usize % 8;
    ARROWS[sector]
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn blit(&mut self, _image: &TileImage, _src: Rect, dst: Rect) {
        self.mark(dst, '#');
        self.blits += 1;
    }

    fn blit_rotated(&mut self, _image: &TileImage, _src: Rect, angle: f32, dst: Rect) {
        self.mark(dst, heading_glyph(angle));
    }

    fn draw_outline(&mut self) {
        if let Err(e) = self.write_frame() {
            warn!(error = %e, "failed to draw terminal frame");
        }
        self.reset();
    }
}

// src/session.rs
//! Live map session: feed updates in, frames out

use crate::config::MapConfig;
use crate::display::terminal::{MapStatus, TerminalRenderer};
use crate::error::Result;
use crate::map::renderer::Renderer;
use crate::map::viewport::ViewportController;
use crate::telemetry::FeedUpdate;
use std::{
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct MapSession {
    map: ViewportController,
    frame_interval: Duration,
    last_frame: Instant,
    rendered_patches: usize,
}

impl MapSession {
    pub fn new(config: &MapConfig) -> Result<Self> {
        Ok(Self::with_controller(
            ViewportController::from_config(config)?,
            Duration::from_millis(config.frame_interval_ms),
        ))
    }

    pub fn with_controller(map: ViewportController, frame_interval: Duration) -> Self {
        Self {
            map,
            frame_interval,
            last_frame: Instant::now(),
            rendered_patches: 0,
        }
    }

    pub fn map(&self) -> &ViewportController {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut ViewportController {
        &mut self.map
    }

    /// Position first, then heading. Returns true if anything visible changed.
    pub fn apply(&mut self, update: FeedUpdate) -> Result<bool> {
        let moved = self
            .map
            .set_marker_position(update.latitude, update.longitude)?;
        let turned = self.map.set_marker_heading(update.heading);
        Ok(moved || turned)
    }

    /// Update the frame and draw it if it changed. Returns true if it was drawn.
    ///
    /// Tiles finishing in the background change the patch list without touching the
    /// controller, so a different patch count also forces a redraw.
    pub fn frame(&mut self, renderer: &mut dyn Renderer) -> bool {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;

        // Failures keep the previous patches; the next tick tries again
        if let Err(e) = self.map.update(dt) {
            debug!(error = %e, transient = e.is_transient(), "frame kept previous patches");
        }

        let patches = self.map.patches().len();
        if !self.map.is_dirty() && patches == self.rendered_patches {
            return false;
        }
        self.map.render(renderer);
        self.rendered_patches = patches;
        true
    }

    /// Run until Ctrl+C, or until `running` is cleared.
    pub async fn run<W: Write>(
        &mut self,
        renderer: &mut TerminalRenderer<W>,
        mut feed: mpsc::Receiver<FeedUpdate>,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut feed_open = true;
        let mut frames: u64 = 0;

        info!(interval_ms = self.frame_interval.as_millis() as u64, "session started");
        while running.load(Ordering::Relaxed) {
            tokio::select! {
                _ = ticker.tick() => {
                    renderer.set_status(MapStatus::from_controller(&self.map));
                    if self.frame(renderer) {
                        frames += 1;
                    }
                }
                update = feed.recv(), if feed_open => match update {
                    Some(update) => {
                        if let Err(e) = self.apply(update) {
                            warn!(error = %e, "ignoring feed update");
                        }
                    }
                    None => {
                        debug!("feed closed");
                        feed_open = false;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    running.store(false, Ordering::Relaxed);
                }
            }
        }

        info!(frames, "session stopped");
        Ok(())
    }
}

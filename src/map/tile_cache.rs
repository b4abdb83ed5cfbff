// src/map/tile_cache.rs
//! Bounded in-memory tile cache for one imagery source
//!
//! Lookups never block. A miss hands the tile to a background worker and reports
//! "not ready"; the decoded image is picked up by polling on a later request. Entries
//! are only evicted when nothing outside the cache still holds their handle.

use super::math::TILE_SIZE;
use super::tile::{TileHandle, TileImage, TileKey, TileLoader};
use crate::error::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{
    mpsc::{self, Receiver, Sender},
    Arc,
};
use tracing::{debug, trace, warn};

/// Smallest capacity a cache is ever built with
pub const MIN_CAPACITY: usize = 4;

/// Default bound on simultaneous background loads per cache
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 4;

/// Requests for a tile that failed to load which are answered "not ready" before
/// it is loaded again
pub const FAILED_RETRY_AFTER: u32 = 64;

type Completion = (TileKey, Result<TileImage>);

struct CacheEntry {
    image: TileHandle,
    last_used: u64,
}

impl CacheEntry {
    /// Handles held outside the cache
    fn ref_count(&self) -> usize {
        Arc::strong_count(&self.image) - 1
    }
}

pub struct TileCache {
    name: String,
    loader: Arc<dyn TileLoader>,
    entries: HashMap<TileKey, CacheEntry>,
    capacity: usize,
    clock: u64,
    in_flight: HashSet<TileKey>,
    /// Failed tiles and the requests left before they are tried again
    backoff: HashMap<TileKey, u32>,
    max_concurrent_loads: usize,
    completed_tx: Sender<Completion>,
    completed_rx: Receiver<Completion>,
    hits: u64,
    misses: u64,
    evictions: u64,
    failed: u64,
}

impl TileCache {
    pub fn new(name: impl Into<String>, loader: Arc<dyn TileLoader>, capacity: usize) -> Self {
        let (completed_tx, completed_rx) = mpsc::channel();
        Self {
            name: name.into(),
            loader,
            entries: HashMap::new(),
            capacity: capacity.max(MIN_CAPACITY),
            clock: 0,
            in_flight: HashSet::new(),
            backoff: HashMap::new(),
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            completed_tx,
            completed_rx,
            hits: 0,
            misses: 0,
            evictions: 0,
            failed: 0,
        }
    }

    pub fn with_max_concurrent_loads(mut self, max: usize) -> Self {
        self.max_concurrent_loads = max.max(1);
        self
    }

    /// Capacity for a viewport of `width` x `height` pixels.
    ///
    /// Worst case is the view straddling the junction of 4 tiles, times the number of
    /// tiles the view spans (at least 1 per axis); two viewports' worth are kept.
    pub fn capacity_for_viewport(width: u32, height: u32) -> usize {
        let tiles_x = (width / TILE_SIZE).max(1) as usize;
        let tiles_y = (height / TILE_SIZE).max(1) as usize;
        (tiles_x * tiles_y * 4 * 2).max(MIN_CAPACITY)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Outstanding handles for `key`, `None` if it is not cached
    pub fn ref_count(&self, key: &TileKey) -> Option<usize> {
        self.entries.get(key).map(CacheEntry::ref_count)
    }

    /// Get a tile if it is ready, otherwise start loading it and return `None`.
    ///
    /// The returned handle counts as a reference until it is dropped.
    pub fn request_tile(&mut self, level: u8, x: u32, y: u32) -> Option<TileHandle> {
        self.poll_completed();

        let key = TileKey::new(level, x, y);
        self.clock += 1;
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_used = self.clock;
            self.hits += 1;
            return Some(Arc::clone(&entry.image));
        }

        self.misses += 1;
        self.dispatch(key);
        None
    }

    /// Put a decoded tile into the cache, evicting if at capacity.
    ///
    /// Returns the cached handle; an already-cached key keeps its existing image.
    pub fn insert(&mut self, key: TileKey, image: TileImage) -> TileHandle {
        self.clock += 1;
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_used = self.clock;
            return Arc::clone(&entry.image);
        }

        // Evict until there is room; an earlier overflow shrinks back once released
        while self.entries.len() >= self.capacity {
            if !self.evict_one() {
                debug!(
                    cache = %self.name,
                    entries = self.entries.len(),
                    capacity = self.capacity,
                    "every cached tile is referenced, growing past capacity"
                );
                break;
            }
        }

        self.backoff.remove(&key);
        let image = Arc::new(image);
        self.entries.insert(
            key,
            CacheEntry {
                image: Arc::clone(&image),
                last_used: self.clock,
            },
        );
        image
    }

    /// Drain finished background loads into the cache. Never blocks.
    pub fn poll_completed(&mut self) -> usize {
        let mut received = 0;
        while let Ok((key, result)) = self.completed_rx.try_recv() {
            self.in_flight.remove(&key);
            received += 1;
            match result {
                Ok(image) => {
                    trace!(cache = %self.name, tile = %key, "tile ready");
                    self.insert(key, image);
                }
                Err(e) => {
                    self.failed += 1;
                    self.backoff.insert(key, FAILED_RETRY_AFTER);
                    debug!(cache = %self.name, tile = %key, error = %e, "tile load failed");
                }
            }
        }
        received
    }

    /// Drop every entry regardless of outstanding handles. Holders keep their image
    /// alive through their own handle.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.backoff.clear();
    }

    /// True while a failed tile is being answered "not ready" without a new load
    pub fn is_backing_off(&self, key: &TileKey) -> bool {
        self.backoff.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            in_flight: self.in_flight.len(),
            failed: self.failed,
        }
    }

    /// Remove the least recently used entry nobody references. False if none qualifies.
    fn evict_one(&mut self) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.ref_count() == 0)
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key);

        match victim {
            Some(key) => {
                self.entries.remove(&key);
                self.evictions += 1;
                trace!(cache = %self.name, tile = %key, "evicted");
                true
            }
            None => false,
        }
    }

    fn dispatch(&mut self, key: TileKey) {
        if self.in_flight.contains(&key) {
            return;
        }
        if let Some(remaining) = self.backoff.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return;
            }
            self.backoff.remove(&key);
        }
        if self.in_flight.len() >= self.max_concurrent_loads {
            trace!(cache = %self.name, tile = %key, "load deferred, too many in flight");
            return;
        }

        let loader = Arc::clone(&self.loader);
        let tx = self.completed_tx.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("tile-load-{}", key))
            .spawn(move || {
                let result = loader.load(key);
                // The cache may be gone by now; nothing to do then.
                let _ = tx.send((key, result));
            });

        match spawned {
            Ok(_) => {
                self.in_flight.insert(key);
            }
            Err(e) => warn!(cache = %self.name, tile = %key, error = %e, "could not start tile load"),
        }
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("name", &self.name)
            .field("loader", &self.loader.describe())
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub in_flight: usize,
    pub failed: u64,
}

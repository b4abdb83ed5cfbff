// src/map/source_chain.rs
//! Ordered fallback over several tile caches

use super::tile::{DirectoryTileLoader, TileHandle};
use super::tile_cache::{CacheStats, TileCache};
use crate::config::TileSourceConfig;
use std::sync::Arc;
use tracing::debug;

/// Caches queried in priority order, e.g. a detailed aeronautical layer first and a
/// generic street map as fallback.
#[derive(Debug, Default)]
pub struct TileSourceChain {
    caches: Vec<TileCache>,
    unavailable: u64,
}

impl TileSourceChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// One directory-backed cache per configured source, in the configured order.
    pub fn from_config(sources: &[TileSourceConfig], capacity: usize, max_loads: usize) -> Self {
        let mut chain = Self::new();
        for source in sources {
            let loader = DirectoryTileLoader::new(&source.path, &source.extension);
            chain.push(
                TileCache::new(source.name.clone(), Arc::new(loader), capacity)
                    .with_max_concurrent_loads(max_loads),
            );
        }
        chain
    }

    /// Append a cache with lower priority than every existing one.
    pub fn push(&mut self, cache: TileCache) {
        self.caches.push(cache);
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    pub fn caches(&self) -> &[TileCache] {
        &self.caches
    }

    pub fn caches_mut(&mut self) -> &mut [TileCache] {
        &mut self.caches
    }

    /// First source that has the tile ready wins.
    ///
    /// A source earlier in the chain that misses still starts its own load, so it can
    /// take over on a later frame once its tile is decoded.
    pub fn request_tile(&mut self, level: u8, x: u32, y: u32) -> Option<TileHandle> {
        for cache in self.caches.iter_mut() {
            if let Some(handle) = cache.request_tile(level, x, y) {
                return Some(handle);
            }
        }

        self.unavailable += 1;
        debug!(level, x, y, "no source could supply this tile");
        None
    }

    pub fn clear(&mut self) {
        for cache in self.caches.iter_mut() {
            cache.clear();
        }
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            sources: self
                .caches
                .iter()
                .map(|cache| (cache.name().to_string(), cache.stats()))
                .collect(),
            unavailable: self.unavailable,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChainStats {
    pub sources: Vec<(String, CacheStats)>,
    /// Requests no source could answer
    pub unavailable: u64,
}

impl ChainStats {
    pub fn total_entries(&self) -> usize {
        self.sources.iter().map(|(_, stats)| stats.entries).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MapError, Result};
    use crate::map::tile::{TileImage, TileKey, TileLoader};

    struct NeverLoader;

    impl TileLoader for NeverLoader {
        fn load(&self, key: TileKey) -> Result<TileImage> {
            Err(MapError::TileUnavailable {
                level: key.level,
                x: key.x,
                y: key.y,
            })
        }
    }

    fn empty_cache(name: &str) -> TileCache {
        TileCache::new(name, Arc::new(NeverLoader), 8)
    }

    #[test]
    fn test_priority_order() {
        let key = TileKey::new(2, 1, 1);
        let mut preferred = empty_cache("preferred");
        let mut fallback = empty_cache("fallback");
        preferred.insert(key, TileImage::filled(256, 256, [1, 0, 0, 255]));
        fallback.insert(key, TileImage::filled(256, 256, [2, 0, 0, 255]));

        let mut chain = TileSourceChain::new();
        chain.push(preferred);
        chain.push(fallback);

        let handle = chain.request_tile(2, 1, 1).unwrap();
        assert_eq!(handle.pixels().get_pixel(0, 0).0[0], 1);
    }

    #[test]
    fn test_falls_back_to_later_source() {
        let key = TileKey::new(2, 1, 1);
        let mut fallback = empty_cache("fallback");
        fallback.insert(key, TileImage::filled(256, 256, [2, 0, 0, 255]));

        let mut chain = TileSourceChain::new();
        chain.push(empty_cache("preferred"));
        chain.push(fallback);

        let handle = chain.request_tile(2, 1, 1).unwrap();
        assert_eq!(handle.pixels().get_pixel(0, 0).0[0], 2);
        // The preferred source was asked and recorded a miss
        assert_eq!(chain.stats().sources[0].1.misses, 1);
    }

    #[test]
    fn test_all_sources_miss() {
        let mut chain = TileSourceChain::new();
        chain.push(empty_cache("a"));
        chain.push(empty_cache("b"));

        assert!(chain.request_tile(0, 0, 0).is_none());
        assert_eq!(chain.stats().unavailable, 1);
    }

    #[test]
    fn test_empty_chain_never_supplies() {
        let mut chain = TileSourceChain::new();
        assert!(chain.is_empty());
        assert!(chain.request_tile(0, 0, 0).is_none());
    }

    #[test]
    fn test_from_config_keeps_order() {
        let sources = vec![
            TileSourceConfig::new("aip", "/maps/osm-aip", "png"),
            TileSourceConfig::new("osm", "/maps/osm", "png"),
        ];
        let chain = TileSourceChain::from_config(&sources, 16, 2);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.caches()[0].name(), "aip");
        assert_eq!(chain.caches()[1].name(), "osm");
        assert_eq!(chain.caches()[0].capacity(), 16);
    }
}

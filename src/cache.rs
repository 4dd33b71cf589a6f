//! Bounded in-memory cache of decoded RAW rasters.
//!
//! Demosaicing is the most expensive step of a RAW request. A caller that
//! compresses the same RAW file to several formats, or retries after a
//! timeout, should not pay it twice. The cache holds at most
//! `codec.cache_items` rasters and evicts the oldest entry first; a capacity
//! of zero disables it.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: the key is the SHA-256 of the RAW
//! file contents plus the [`RawDecodeMode`]. Paths never enter the key, so
//! a spilled temp file and the original on disk share an entry, and an
//! edited file at the same path misses.

use crate::raw::RawDecodeMode;
use image::DynamicImage;
use image::metadata::Orientation;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source_hash: String,
    pub mode: RawDecodeMode,
}

impl CacheKey {
    pub fn new(source: &[u8], mode: RawDecodeMode) -> Self {
        Self {
            source_hash: hash_bytes(source),
            mode,
        }
    }
}

/// SHA-256 of a byte buffer, returned as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// A developed RAW raster and the orientation its camera recorded.
#[derive(Clone)]
pub struct Developed {
    pub image: Arc<DynamicImage>,
    pub orientation: Orientation,
}

struct Entry {
    key: CacheKey,
    developed: Developed,
}

/// FIFO-evicting raster cache, safe to share between requests.
pub struct DecodeCache {
    capacity: usize,
    entries: Mutex<VecDeque<Entry>>,
    stats: Mutex<CacheStats>,
}

impl DecodeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn get(&self, key: &CacheKey) -> Option<Developed> {
        if !self.is_enabled() {
            return None;
        }
        let found = self
            .entries
            .lock()
            .ok()?
            .iter()
            .find(|e| &e.key == key)
            .map(|e| e.developed.clone());
        if let Ok(mut stats) = self.stats.lock() {
            if found.is_some() {
                stats.hit();
            } else {
                stats.miss();
            }
        }
        found
    }

    pub fn insert(&self, key: CacheKey, developed: Developed) {
        if !self.is_enabled() {
            return;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.retain(|e| e.key != key);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(Entry { key, developed });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }
}

/// Lookup counters since the cache was created. Saturate at `u64::MAX`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits = self.hits.saturating_add(1);
    }

    pub fn miss(&mut self) {
        self.misses = self.misses.saturating_add(1);
    }

    pub fn total(&self) -> u64 {
        self.hits.saturating_add(self.misses)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(f, "{} cached, {} decoded ({} total)", self.hits, self.misses, self.total())
        } else {
            write!(f, "{} decoded", self.misses)
        }
    }
}

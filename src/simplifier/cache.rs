//! # Explanation Cache
//!
//! A bounded, process-wide store of generated explanations keyed by normalized input.
//!
//! ## Policy:
//! - **Capacity**: least-recently-used entries are evicted once `capacity` is reached
//! - **TTL** (optional): an entry older than the TTL counts as a miss and is dropped on access
//! - **clear()**: removes everything and reports how many entries were dropped
//!
//! There is no ordering guarantee for consumers and nothing is persisted across restarts.

use crate::simplifier::client::ExplanationResult;
use crate::simplifier::prompt::SimplificationLevel;
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Normalized identity of a request: case-folded, trimmed text plus the resolved level.
///
/// `"Photosynthesis"` and `" photosynthesis "` produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text: String,
    level: SimplificationLevel,
}

impl CacheKey {
    pub fn new(text: &str, level: SimplificationLevel) -> Self {
        Self {
            text: text.trim().to_lowercase(),
            level,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug)]
struct CacheEntry {
    result: ExplanationResult,
    stored_at: Instant,
}

/// Point-in-time view of the cache for the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_secs: Option<u64>,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug)]
pub struct ExplanationCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ExplanationCache {
    pub fn new(capacity: NonZeroUsize, ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache with a capacity taken from configuration. A zero capacity is bumped to 1;
    /// `AppConfig::validate` rejects it before we get here anyway.
    pub fn with_capacity(capacity: usize, ttl: Option<Duration>) -> Self {
        Self::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN), ttl)
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, CacheEntry>> {
        // Poisoning is ignored; every LRU operation leaves the map consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, stored_at: Instant) -> bool {
        self.ttl.is_some_and(|ttl| stored_at.elapsed() >= ttl)
    }

    /// Look up a previously stored result. Refreshes the entry's LRU position.
    pub fn get(&self, key: &CacheKey) -> Option<ExplanationResult> {
        let mut entries = self.lock();
        let found = entries
            .get(key)
            .map(|entry| (self.is_expired(entry.stored_at), entry.result.clone()));

        match found {
            Some((false, result)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            Some((true, _)) => {
                entries.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result. Replaces any existing entry for the key (last write wins).
    pub fn put(&self, key: CacheKey, result: ExplanationResult) {
        self.lock().put(
            key,
            CacheEntry {
                result,
                stored_at: Instant::now(),
            },
        );
    }

    /// Presence check that does not touch LRU order or hit/miss counters.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock()
            .peek(key)
            .is_some_and(|entry| !self.is_expired(entry.stored_at))
    }

    /// Remove every entry and return how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        CacheStats {
            entries: entries.len(),
            capacity: entries.cap().get(),
            ttl_secs: self.ttl.map(|ttl| ttl.as_secs()),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

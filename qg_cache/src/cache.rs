use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use qg_types::Clock;
use qg_types::SystemClock;
use qg_types::clock::duration_to_nanos;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::error::Result;
use crate::key::CacheKey;

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room for a new key
    pub evictions: u64,
    /// Entries removed because their TTL ran out
    pub expirations: u64,
    pub current_size: usize,
    pub max_size: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when nothing was looked up
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: u64,
    ttl: u64,
    last_accessed: u64,
}

impl<V> CacheEntry<V> {
    #[inline]
    fn is_expired(&self, now: u64) -> bool {
        // A clock behind the insertion counts as no time having passed
        now.saturating_sub(self.inserted_at) >= self.ttl
    }
}

struct CacheInner<V> {
    entries: LruCache<CacheKey, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// LRU cache of provider responses with per-entry TTL
///
/// Expired entries are removed either by the lookup that finds them or by
/// `cleanup_expired`; both paths run under the same lock so each removal is
/// counted once.
pub struct ResponseCache<V> {
    config: CacheConfig,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.max_size).ok_or_else(|| CacheError::InvalidConfig("max_size must be greater than 0".to_string()))?;

        info!(max_size = config.max_size, default_ttl_s = config.default_ttl_seconds, "Response cache created");

        Ok(Self {
            default_ttl: config.default_ttl(),
            config,
            clock,
            inner: Mutex::new(CacheInner { entries: LruCache::new(capacity), hits: 0, misses: 0, evictions: 0, expirations: 0 }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up `key`, refreshing its recency on a hit
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now_nanos();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        match inner.entries.get_mut(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed = now;
                inner.hits += 1;
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        inner.entries.pop(key);
        inner.expirations += 1;
        inner.misses += 1;
        debug!(key = %key, "Cache entry expired on access");
        None
    }

    /// Insert or overwrite `key` for `ttl`
    ///
    /// A new key arriving at capacity evicts the least recently used entry.
    /// A zero `ttl` stores nothing and drops any existing entry.
    pub fn set(&self, key: CacheKey, value: V, ttl: Duration) {
        let now = self.clock.now_nanos();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if ttl.is_zero() {
            inner.entries.pop(&key);
            return;
        }

        let entry = CacheEntry { value, inserted_at: now, ttl: duration_to_nanos(ttl), last_accessed: now };
        if let Some((old_key, old_entry)) = inner.entries.push(key.clone(), entry) {
            // push hands back either the replaced value for `key` or the evicted LRU entry
            if old_key != key {
                if old_entry.is_expired(now) {
                    inner.expirations += 1;
                } else {
                    inner.evictions += 1;
                    debug!(evicted = %old_key, idle_ms = now.saturating_sub(old_entry.last_accessed) / 1_000_000, "Evicted least recently used entry");
                }
            }
        }
    }

    /// Insert with the configured default TTL
    pub fn set_default(&self, key: CacheKey, value: V) {
        self.set(key, value, self.default_ttl);
    }

    pub fn remove(&self, key: &CacheKey) -> Option<V> {
        self.inner.lock().entries.pop(key).map(|entry| entry.value)
    }

    /// Whether `key` holds an unexpired value; does not touch recency or stats
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = self.clock.now_nanos();
        self.inner.lock().entries.peek(key).is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remove every expired entry regardless of recency, returning how many
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_nanos();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired: Vec<CacheKey> = inner.entries.iter().filter(|(_, entry)| entry.is_expired(now)).map(|(key, _)| key.clone()).collect();
        for key in &expired {
            inner.entries.pop(key);
        }
        inner.expirations += expired.len() as u64;

        if !expired.is_empty() {
            info!(removed = expired.len(), remaining = inner.entries.len(), "Cleaned up expired cache entries");
        }
        expired.len()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Entries held, including expired ones not yet discovered
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn get_stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
            current_size: inner.entries.len(),
            max_size: self.config.max_size,
        }
    }
}

//! # LRU Cache and Rate Counters
//!
//! Caches used by the request path:
//!
//! - [`LruCache`] keeps resolved user contexts so authenticated requests do
//!   not hit the store for every call. Entries carry an optional wall-clock
//!   expiry; recency is tracked with a logical clock so eviction order is
//!   deterministic.
//! - [`RateCounter`] counts events per key inside fixed windows (the email
//!   and OTP send limits).
//!
//! Neither type is synchronized; the app wraps them in a mutex.

use crate::Timestamp;
use chrono::Duration;
use std::collections::BTreeMap;

// =============================================================================
// LRU CACHE CONFIGURATION
// =============================================================================

/// Default maximum cache size.
pub const DEFAULT_CACHE_SIZE: usize = 10_000;

/// Default eviction batch size (number of entries to evict at once).
pub const DEFAULT_EVICTION_BATCH: usize = 100;

/// Prefix for cached user contexts.
pub const USER_CONTEXT_PREFIX: &str = "user-context";

// =============================================================================
// CACHE ENTRY
// =============================================================================

/// An entry in the LRU cache.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value.
    pub value: T,

    /// Logical timestamp of last access (for LRU ordering).
    pub last_access: u64,

    /// Wall-clock expiry, if any.
    pub expires_at: Option<Timestamp>,
}

impl<T> CacheEntry<T> {
    fn new(value: T, timestamp: u64, expires_at: Option<Timestamp>) -> Self {
        Self {
            value,
            last_access: timestamp,
            expires_at,
        }
    }

    fn touch(&mut self, timestamp: u64) {
        self.last_access = timestamp;
    }

    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

// =============================================================================
// LRU CACHE
// =============================================================================

/// LRU cache with optional per-entry expiry.
#[derive(Debug)]
pub struct LruCache<K: Ord + Clone, V: Clone> {
    entries: BTreeMap<K, CacheEntry<V>>,
    max_size: usize,
    eviction_batch: usize,
    /// Time to live applied by [`LruCache::insert_at`].
    ttl: Option<Duration>,
    logical_clock: u64,
}

impl<K: Ord + Clone, V: Clone> Default for LruCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl<K: Ord + Clone, V: Clone> LruCache<K, V> {
    /// Create a new LRU cache with the given maximum size.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_size: max_size.max(1),
            eviction_batch: DEFAULT_EVICTION_BATCH,
            ttl: None,
            logical_clock: 0,
        }
    }

    /// Create with custom eviction batch size.
    #[must_use]
    pub fn with_eviction_batch(mut self, batch_size: usize) -> Self {
        self.eviction_batch = batch_size.max(1);
        self
    }

    /// Expire entries `ttl` after insertion.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Get a live value, updating recency. Expired entries are dropped.
    pub fn get_at(&mut self, key: &K, now: Timestamp) -> Option<&V> {
        self.logical_clock = self.logical_clock.saturating_add(1);
        let timestamp = self.logical_clock;

        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }

        let entry = self.entries.get_mut(key)?;
        entry.touch(timestamp);
        Some(&entry.value)
    }

    /// Insert a value that never expires.
    pub fn insert(&mut self, key: K, value: V) {
        self.insert_entry(key, value, None);
    }

    /// Insert a value, applying the configured TTL from `now`.
    pub fn insert_at(&mut self, key: K, value: V, now: Timestamp) {
        let expires_at = self.ttl.map(|ttl| now + ttl);
        self.insert_entry(key, value, expires_at);
    }

    fn insert_entry(&mut self, key: K, value: V, expires_at: Option<Timestamp>) {
        self.logical_clock = self.logical_clock.saturating_add(1);
        let timestamp = self.logical_clock;

        if self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            self.evict();
        }

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            entry.touch(timestamp);
        } else {
            self.entries
                .insert(key, CacheEntry::new(value, timestamp, expires_at));
        }
    }

    /// Remove a specific key from the cache.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    /// Remove every entry whose key matches.
    pub fn remove_where(&mut self, pred: impl Fn(&K, &V) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, e| !pred(k, &e.value));
        before - self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Evict least recently used entries, one batch at a time.
    fn evict(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        let to_evict = self.eviction_batch.min(self.entries.len());

        let mut by_access: BTreeMap<u64, Vec<K>> = BTreeMap::new();
        for (key, entry) in &self.entries {
            by_access
                .entry(entry.last_access)
                .or_default()
                .push(key.clone());
        }

        let mut evicted = 0;
        'outer: for (_access_time, keys) in by_access {
            for key in keys {
                self.entries.remove(&key);
                evicted += 1;
                if evicted >= to_evict {
                    break 'outer;
                }
            }
        }
    }
}

/// Cache key for a resolved user context.
///
/// Contexts are cached per (auth token, session token) pair so that ending
/// one session does not invalidate the user's other devices.
#[must_use]
pub fn context_key(auth_token: &str, session_token: Option<&str>) -> String {
    format!(
        "{USER_CONTEXT_PREFIX}:{auth_token}:{}",
        session_token.unwrap_or("-")
    )
}

// =============================================================================
// RATE COUNTER
// =============================================================================

/// Fixed-window event counter.
///
/// `hit` records one event for a key and returns the count inside the
/// current window. Windows start at the first event for the key.
#[derive(Debug)]
pub struct RateCounter {
    window: Duration,
    windows: BTreeMap<String, (Timestamp, u64)>,
}

impl RateCounter {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            windows: BTreeMap::new(),
        }
    }

    /// Record one event and return the count for the current window.
    pub fn hit(&mut self, key: &str, now: Timestamp) -> u64 {
        let window = self.window;
        let slot = self
            .windows
            .entry(key.to_string())
            .or_insert((now, 0));
        if now - slot.0 >= window {
            *slot = (now, 0);
        }
        slot.1 = slot.1.saturating_add(1);
        slot.1
    }
}

// =============================================================================
// TESTS
// =============================================================================

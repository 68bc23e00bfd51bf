//! TTL + LRU memoisation cache.
//!
//! Every entry carries an absolute expiry. Recency is tracked by a monotonic
//! access tick kept in an ordered index, so the least-recently-accessed entry
//! is found in `O(log n)` when an insert hits capacity.
//!
//! The cache is process-local and never a source of truth for what it holds.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::sweeper::Sweep;

/// Cache sizing and expiry defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of live entries. Values below 1 are treated as 1.
    pub max_entries: usize,
    /// TTL applied by [`TtlCache::set`].
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            default_ttl: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Create a config with the given capacity and default TTL.
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            max_entries,
            default_ttl,
        }
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room for an insert.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    pub size: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_accessed: Instant,
    tick: u64,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    recency: BTreeMap<u64, K>,
    next_tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<K, V> CacheState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn bump_tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    fn evict_lru(&mut self) {
        if let Some((_, key)) = self.recency.pop_first() {
            self.entries.remove(&key);
            self.evictions += 1;
        }
    }
}

/// Generic in-process cache with per-entry TTL and LRU eviction.
///
/// ```
/// use cms_limits::{CacheConfig, TtlCache};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = TtlCache::new(CacheConfig::new(2, Duration::from_secs(60)));
/// cache.set("a", 1);
/// cache.set("b", 2);
/// cache.get(&"a");      // "a" is now the most recently used
/// cache.set("c", 3);    // evicts "b"
///
/// assert!(cache.has(&"a"));
/// assert!(!cache.has(&"b"));
/// # }
/// ```
#[derive(Debug)]
pub struct TtlCache<K, V> {
    config: CacheConfig,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config: CacheConfig {
                max_entries: config.max_entries.max(1),
                ..config
            },
            state: Mutex::new(CacheState::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live entry, refreshing its recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => entry.expires_at <= now,
        };

        if expired {
            state.remove(key);
            state.expirations += 1;
            state.misses += 1;
            return None;
        }

        let tick = state.bump_tick();
        let entry = state.entries.get_mut(key)?;
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        entry.last_accessed = now;
        let value = entry.value.clone();

        state.recency.remove(&old_tick);
        state.recency.insert(tick, key.clone());
        state.hits += 1;
        Some(value)
    }

    /// Insert with the default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.config.default_ttl);
    }

    /// Insert with an explicit TTL.
    ///
    /// Replacing an existing key never evicts. Inserting a new key while the
    /// cache is full evicts exactly one least-recently-accessed entry.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut state = self.state.lock();

        let replaced = state.remove(&key).is_some();
        if !replaced && state.entries.len() >= self.config.max_entries {
            state.evict_lru();
        }

        let tick = state.bump_tick();
        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
                last_accessed: now,
                tick,
            },
        );
    }

    /// Remove an entry. Returns whether it was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.state.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
    }

    /// Whether a live entry exists. Does not touch recency or hit counters.
    pub fn has(&self, key: &K) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.expires_at > now)
    }

    /// Time since the entry was last read or written.
    pub fn idle_time(&self, key: &K) -> Option<Duration> {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .get(key)
            .map(|entry| now.saturating_duration_since(entry.last_accessed))
    }

    /// Purge expired entries, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired: Vec<K> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        state.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
            size: state.entries.len(),
        }
    }
}

impl<K, V> Sweep for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn sweep(&self) -> usize {
        self.cleanup()
    }
}

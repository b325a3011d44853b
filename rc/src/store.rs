//! ResponseCache implementation

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::key::CacheKey;
use crate::stats::{CacheStats, format_hit_rate};

/// Expiry used when `now + ttl` overflows (about 30 years)
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// A stored value and its bookkeeping
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    created_at: Instant,
    last_accessed: Instant,
    /// Monotonic access counter, breaks ties between equal instants
    access_seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn touch(&mut self, now: Instant, seq: u64) {
        self.last_accessed = now;
        self.access_seq = seq;
    }
}

/// Internal state protected by mutex
struct CacheInner<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    access_seq: u64,
}

impl<V> CacheInner<V> {
    fn next_seq(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    fn evict_lru(&mut self) -> Option<CacheKey> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.last_accessed, entry.access_seq))
            .map(|(key, _)| key.clone())?;
        self.entries.remove(&victim);
        Some(victim)
    }
}

/// Bounded response cache with TTL expiry and LRU eviction
///
/// All operations are synchronous and never fail. When created inside a
/// Tokio runtime, a background task sweeps expired entries every
/// `sweep_interval`; call [`ResponseCache::destroy`] at shutdown to stop it.
pub struct ResponseCache<V> {
    inner: Arc<Mutex<CacheInner<V>>>,
    max_size: usize,
    default_ttl: Duration,
    sweeper: CancellationToken,
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + 'static,
{
    /// Create a new cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        debug!(?config, "ResponseCache::new: called");
        let cache = Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                access_seq: 0,
            })),
            max_size: config.max_size,
            default_ttl: config.ttl(),
            sweeper: CancellationToken::new(),
        };
        cache.spawn_sweeper(config.sweep_interval());
        cache
    }

    fn spawn_sweeper(&self, interval: Duration) {
        if interval.is_zero() {
            warn!("ResponseCache: sweep interval is zero, periodic sweep disabled");
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("ResponseCache: no tokio runtime, periodic sweep disabled");
            return;
        };

        let inner: Weak<Mutex<CacheInner<V>>> = Arc::downgrade(&self.inner);
        let token = self.sweeper.clone();

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("ResponseCache sweeper: cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(inner) = inner.upgrade() else {
                            debug!("ResponseCache sweeper: cache dropped");
                            break;
                        };
                        let removed = inner.lock().purge_expired(Instant::now());
                        if removed > 0 {
                            debug!(removed, "ResponseCache sweeper: removed expired entries");
                        }
                    }
                }
            }
        });
    }

    /// Look up a value
    ///
    /// A hit refreshes the entry's last-access time. An expired entry counts
    /// as a miss and is removed.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = Instant::now();

        match inner.entries.get(key).map(|entry| entry.is_expired(now)) {
            Some(false) => {
                let seq = inner.next_seq();
                inner.hits += 1;
                let entry = inner.entries.get_mut(key)?;
                entry.touch(now, seq);
                debug!(%key, "ResponseCache::get: hit");
                Some(entry.value.clone())
            }
            Some(true) => {
                inner.entries.remove(key);
                inner.misses += 1;
                debug!(%key, "ResponseCache::get: expired");
                None
            }
            None => {
                inner.misses += 1;
                debug!(%key, "ResponseCache::get: miss");
                None
            }
        }
    }

    /// Store a value with the default TTL
    pub fn set(&self, key: CacheKey, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Store a value that expires after `ttl`
    ///
    /// When the cache is full and `key` is new, the least recently accessed
    /// entry is evicted first.
    pub fn set_with_ttl(&self, key: CacheKey, value: V, ttl: Duration) {
        if self.max_size == 0 {
            debug!(%key, "ResponseCache::set: max_size is zero, not storing");
            return;
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = Instant::now();

        if !inner.entries.contains_key(&key)
            && inner.entries.len() >= self.max_size
            && let Some(evicted) = inner.evict_lru()
        {
            debug!(%evicted, "ResponseCache::set: evicted least recently used");
        }

        let seq = inner.next_seq();
        debug!(%key, ?ttl, "ResponseCache::set: storing");
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE),
                created_at: now,
                last_accessed: now,
                access_seq: seq,
            },
        );
    }

    /// Whether a live entry exists, without touching it or the counters
    pub fn contains(&self, key: &CacheKey) -> bool {
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Age of a live entry
    pub fn age(&self, key: &CacheKey) -> Option<Duration> {
        let inner = self.inner.lock();
        let now = Instant::now();
        inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| now - entry.created_at)
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let removed = self.inner.lock().purge_expired(Instant::now());
        debug!(removed, "ResponseCache::purge_expired");
        removed
    }

    /// Remove all entries and reset the hit/miss counters
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let size = inner.entries.len();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        info!(size, "ResponseCache::clear: cleared");
        size
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: format_hit_rate(inner.hits, inner.misses),
            ttl: self.default_ttl.as_secs(),
        }
    }

    /// Stop the periodic sweep and drop all entries
    pub fn destroy(&self) {
        debug!("ResponseCache::destroy: called");
        self.sweeper.cancel();
        self.clear();
    }
}

impl<V> Drop for ResponseCache<V> {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::RequestDescriptor;

    fn key(name: &str) -> CacheKey {
        RequestDescriptor::new("GET", format!("/{name}")).cache_key()
    }

    fn cache(max_size: usize, ttl_secs: u64) -> ResponseCache<String> {
        ResponseCache::new(CacheConfig {
            max_size,
            ttl_secs,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get() {
        let cache = cache(10, 60);
        cache.set(key("a"), "alpha".to_string());

        assert_eq!(cache.get(&key("a")), Some("alpha".to_string()));
        assert_eq!(cache.get(&key("b")), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, "50.00%");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_read_is_miss_and_removes_entry() {
        let cache = cache(10, 5);
        cache.set(key("a"), "alpha".to_string());
        assert!(cache.contains(&key("a")));

        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_entry_ttl() {
        let cache = cache(10, 3600);
        cache.set_with_ttl(key("short"), "s".to_string(), Duration::from_secs(1));
        cache.set(key("long"), "l".to_string());

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.get(&key("short")), None);
        assert_eq!(cache.get(&key("long")), Some("l".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction_spares_recently_read() {
        let cache = cache(3, 60);
        cache.set(key("a"), "a".to_string());
        cache.set(key("b"), "b".to_string());
        cache.set(key("c"), "c".to_string());

        // Touch the oldest so "b" becomes least recently used
        assert!(cache.get(&key("a")).is_some());

        cache.set(key("d"), "d".to_string());

        assert_eq!(cache.len(), 3);
        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert!(cache.contains(&key("d")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let cache = cache(2, 60);
        cache.set(key("a"), "a1".to_string());
        cache.set(key("b"), "b".to_string());
        cache.set(key("a"), "a2".to_string());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("a")), Some("a2".to_string()));
        assert!(cache.contains(&key("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_never_exceeds_max() {
        let cache = cache(5, 60);
        for i in 0..50 {
            cache.set(key(&i.to_string()), i.to_string());
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.stats().size, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_size_stores_nothing() {
        let cache = cache(0, 60);
        cache.set(key("a"), "a".to_string());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_resets_counters() {
        let cache = cache(10, 60);
        cache.set(key("a"), "a".to_string());
        cache.set(key("b"), "b".to_string());
        cache.get(&key("a"));
        cache.get(&key("missing"));

        assert_eq!(cache.clear(), 2);

        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate, "0%");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_reports_config() {
        let cache = cache(42, 120);
        let stats = cache.stats();
        assert_eq!(stats.max_size, 42);
        assert_eq!(stats.ttl, 120);
        assert_eq!(stats.hit_rate, "0%");
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = cache(10, 60);
        cache.set_with_ttl(key("a"), "a".to_string(), Duration::from_secs(1));
        cache.set_with_ttl(key("b"), "b".to_string(), Duration::from_secs(1));
        cache.set(key("c"), "c".to_string());

        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_age_tracks_creation() {
        let cache = cache(10, 60);
        cache.set(key("a"), "a".to_string());
        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(cache.age(&key("a")), Some(Duration::from_secs(7)));
        assert_eq!(cache.age(&key("missing")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweep_removes_unread_entries() {
        let cache: ResponseCache<String> = ResponseCache::new(CacheConfig {
            ttl_secs: 1,
            sweep_interval_secs: 1,
            ..Default::default()
        });
        cache.set(key("a"), "a".to_string());

        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_stops_sweeper_and_clears() {
        let cache: ResponseCache<String> = ResponseCache::new(CacheConfig {
            ttl_secs: 1,
            sweep_interval_secs: 1,
            ..Default::default()
        });
        cache.set(key("a"), "a".to_string());
        cache.destroy();
        assert!(cache.is_empty());

        // Entries written after destroy are no longer swept
        cache.set(key("b"), "b".to_string());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_works_without_runtime() {
        let cache = cache(2, 60);
        cache.set(key("a"), "a".to_string());
        assert_eq!(cache.get(&key("a")), Some("a".to_string()));
    }
}

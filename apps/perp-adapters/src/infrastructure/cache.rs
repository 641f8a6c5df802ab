//! Stale-time / cache-time memoized fetch.
//!
//! An entry younger than `stale_time` is served without fetching. Older
//! entries trigger a fetch; if that fetch fails, an entry younger than
//! `cache_time` is served instead. Entries older than `cache_time` are
//! dropped. Concurrent callers for the same key share one fetch.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::observability::record_cache_lookup;

/// Freshness windows for one class of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Serve without refetching while younger than this.
    pub stale_time: Duration,
    /// Keep as a fallback while younger than this.
    pub cache_time: Duration,
}

impl CachePolicy {
    /// Build a policy. `cache_time` is raised to `stale_time` if smaller.
    #[must_use]
    pub fn new(stale_time: Duration, cache_time: Duration) -> Self {
        Self {
            stale_time,
            cache_time: cache_time.max(stale_time),
        }
    }

    /// Policy that never serves cached values.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            stale_time: Duration::ZERO,
            cache_time: Duration::ZERO,
        }
    }
}

#[derive(Clone)]
struct Entry<V> {
    value: V,
    fetched_at: Instant,
}

/// Memoized async fetch keyed by `K`.
pub struct TimedCache<K, V> {
    name: &'static str,
    policy: CachePolicy,
    entries: RwLock<HashMap<K, Entry<V>>>,
    in_flight: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K, V> std::fmt::Debug for TimedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedCache")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<K, V> TimedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// New empty cache. `name` labels metrics and logs.
    #[must_use]
    pub fn new(name: &'static str, policy: CachePolicy) -> Self {
        Self {
            name,
            policy,
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// The freshness policy.
    #[must_use]
    pub const fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Return a fresh cached value or run `fetch`.
    pub async fn get_or_fetch<E, F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
    where
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.fresh(&key).await {
            record_cache_lookup(self.name, "hit");
            return Ok(value);
        }

        let gate = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };
        let _guard = gate.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(value) = self.fresh(&key).await {
            record_cache_lookup(self.name, "hit");
            return Ok(value);
        }

        record_cache_lookup(self.name, "miss");
        let result = match fetch().await {
            Ok(value) => {
                self.entries.write().await.insert(
                    key.clone(),
                    Entry {
                        value: value.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Ok(value)
            }
            Err(error) => match self.within_cache_time(&key).await {
                Some(value) => {
                    tracing::warn!(
                        cache = self.name,
                        error = %error,
                        "Fetch failed, serving stale value"
                    );
                    record_cache_lookup(self.name, "stale");
                    Ok(value)
                }
                None => Err(error),
            },
        };

        self.in_flight.lock().await.remove(&key);
        result
    }

    /// Drop one entry.
    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    /// Drop every entry older than `cache_time`. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let cache_time = self.policy.cache_time;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.fetched_at.elapsed() < cache_time);
        before - entries.len()
    }

    /// Number of entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn fresh(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.policy.stale_time)
            .map(|entry| entry.value.clone())
    }

    async fn within_cache_time(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.fetched_at.elapsed() < self.policy.cache_time => {
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(stale_ms: u64, cache_ms: u64) -> CachePolicy {
        CachePolicy::new(
            Duration::from_millis(stale_ms),
            Duration::from_millis(cache_ms),
        )
    }

    #[tokio::test]
    async fn fresh_value_is_served_without_fetching() {
        let cache: TimedCache<&str, u32> = TimedCache::new("test", policy(60_000, 120_000));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_fetch("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_value_triggers_refetch() {
        let cache: TimedCache<&str, u32> = TimedCache::new("test", policy(0, 60_000));
        let first = cache.get_or_fetch("k", || async { Ok::<_, String>(1) }).await;
        let second = cache.get_or_fetch("k", || async { Ok::<_, String>(2) }).await;
        assert_eq!(first.unwrap(), 1);
        assert_eq!(second.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_refetch_falls_back_within_cache_time() {
        let cache: TimedCache<&str, u32> = TimedCache::new("test", policy(0, 60_000));
        cache
            .get_or_fetch("k", || async { Ok::<_, String>(5) })
            .await
            .unwrap();

        let value = cache
            .get_or_fetch("k", || async { Err::<u32, _>("venue down".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn failed_fetch_without_entry_propagates() {
        let cache: TimedCache<&str, u32> = TimedCache::new("test", policy(1_000, 1_000));
        let err = cache
            .get_or_fetch("k", || async { Err::<u32, _>("boom".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
    }

    #[tokio::test]
    async fn expired_entry_is_not_used_as_fallback() {
        let cache: TimedCache<&str, u32> = TimedCache::new("test", CachePolicy::disabled());
        cache
            .get_or_fetch("k", || async { Ok::<_, String>(5) })
            .await
            .unwrap();
        let result = cache
            .get_or_fetch("k", || async { Err::<u32, _>("down".to_string()) })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let cache: Arc<TimedCache<&str, u32>> =
            Arc::new(TimedCache::new("test", policy(60_000, 60_000)));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_fetch("k", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, String>(42)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn purge_and_invalidate() {
        let cache: TimedCache<u8, u8> = TimedCache::new("test", policy(0, 0));
        cache.get_or_fetch(1, || async { Ok::<_, String>(1) }).await.unwrap();
        cache.get_or_fetch(2, || async { Ok::<_, String>(2) }).await.unwrap();
        assert_eq!(cache.purge_expired().await, 2);

        let cache: TimedCache<u8, u8> = TimedCache::new("test", policy(60_000, 60_000));
        cache.get_or_fetch(1, || async { Ok::<_, String>(1) }).await.unwrap();
        cache.invalidate(&1).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn windows_follow_the_clock() {
        let cache: TimedCache<&str, u32> = TimedCache::new("prices", policy(2_000, 30_000));
        let fail = || async { Err::<u32, _>("venue down".to_string()) };
        cache.get_or_fetch("eth", || async { Ok::<_, String>(1) }).await.unwrap();

        tokio::time::advance(Duration::from_millis(1_000)).await;
        let fresh = cache.get_or_fetch("eth", || async { Ok::<_, String>(2) }).await;
        assert_eq!(fresh.unwrap(), 1);

        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(cache.get_or_fetch("eth", fail).await.unwrap(), 1);

        tokio::time::advance(Duration::from_millis(28_000)).await;
        assert_eq!(cache.get_or_fetch("eth", fail).await.unwrap_err(), "venue down");
        assert!(cache.is_empty().await);
    }

    #[test]
    fn cache_time_never_below_stale_time() {
        let p = policy(5_000, 1_000);
        assert_eq!(p.cache_time, Duration::from_millis(5_000));
    }
}

//! Per-resource TTL cache with reference-stable values

use crate::clock::{system_clock, Clock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// TTL cache in front of one resource's fetch path.
///
/// Consumers may rely on reference identity (`Arc::ptr_eq`) to skip
/// redundant work: within one TTL window `get_with` always hands back the
/// same `Arc`. After expiry or `invalidate()` the next call fetches fresh
/// and installs a new `Arc`, even when the value is equal.
///
/// A fetch that fails (`None`) keeps serving the last good value without
/// refreshing its timestamp, so the next call retries (stale while
/// revalidate). Before any value has loaded, failures resolve to one
/// canonical empty `Arc` — never null; `is_loaded` is the explicit flag
/// that distinguishes "empty" from "not yet loaded".
pub struct ResourceCache<T> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    empty: Arc<T>,
    entry: Mutex<Option<(Arc<T>, Instant)>>,
    loaded: AtomicBool,
}

impl<T: Default> ResourceCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, system_clock())
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            empty: Arc::new(T::default()),
            entry: Mutex::new(None),
            loaded: AtomicBool::new(false),
        }
    }

    /// Returns the cached value when fresh, otherwise runs `fetch`.
    /// `fetch` returning `None` signals a failed fetch, not an empty result;
    /// genuinely empty resources must return `Some(T::default())`.
    pub async fn get_with<F, Fut>(&self, fetch: F) -> Arc<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        if let Some(value) = self.fresh() {
            return value;
        }

        match fetch().await {
            Some(value) => {
                let arc = Arc::new(value);
                *self.entry.lock().unwrap() = Some((arc.clone(), self.clock.now()));
                self.loaded.store(true, Ordering::Relaxed);
                arc
            }
            None => {
                // Keep serving the last good value; its timestamp stays
                // untouched so the next call retries.
                match self.entry.lock().unwrap().as_ref() {
                    Some((stale, _)) => stale.clone(),
                    None => self.empty.clone(),
                }
            }
        }
    }

    fn fresh(&self) -> Option<Arc<T>> {
        let entry = self.entry.lock().unwrap();
        match entry.as_ref() {
            Some((value, stamp)) if self.clock.now().duration_since(*stamp) < self.ttl => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Last stored value regardless of freshness, without fetching.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.entry
            .lock()
            .unwrap()
            .as_ref()
            .map(|(value, _)| value.clone())
    }

    /// True once any fetch has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Relaxed)
    }

    /// Drops the cached entry; the next `get_with` fetches fresh.
    pub fn invalidate(&self) {
        *self.entry.lock().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    const TTL: Duration = Duration::from_millis(5_000);

    fn cache_with_clock() -> (ResourceCache<Vec<String>>, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new());
        let cache = ResourceCache::with_clock(TTL, clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_same_reference_within_ttl() {
        let (cache, _clock) = cache_with_clock();

        let first = cache.get_with(|| async { Some(vec!["a".to_string()]) }).await;
        let second = cache
            .get_with(|| async { panic!("must not fetch within TTL") })
            .await;

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_new_reference_after_expiry_even_when_equal() {
        let (cache, clock) = cache_with_clock();

        let first = cache.get_with(|| async { Some(vec!["a".to_string()]) }).await;
        clock.advance(TTL + Duration::from_millis(1));
        let second = cache.get_with(|| async { Some(vec!["a".to_string()]) }).await;

        assert_eq!(first, second);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_invalidate_forces_fresh_fetch() {
        let (cache, _clock) = cache_with_clock();

        let first = cache.get_with(|| async { Some(vec!["a".to_string()]) }).await;
        cache.invalidate();
        let second = cache.get_with(|| async { Some(vec!["a".to_string()]) }).await;

        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_failed_fetch_before_load_yields_canonical_empty() {
        let (cache, _clock) = cache_with_clock();

        let first = cache.get_with(|| async { None }).await;
        let second = cache.get_with(|| async { None }).await;

        assert!(first.is_empty());
        // Canonical empty is reference-stable across failed fetches
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!cache.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_fetch_serves_stale_and_retries() {
        let (cache, clock) = cache_with_clock();

        let good = cache.get_with(|| async { Some(vec!["a".to_string()]) }).await;
        clock.advance(TTL + Duration::from_millis(1));

        // Failure keeps the stale value visible
        let stale = cache.get_with(|| async { None }).await;
        assert!(Arc::ptr_eq(&good, &stale));

        // Next call retries immediately and replaces the entry
        let fresh = cache.get_with(|| async { Some(vec!["b".to_string()]) }).await;
        assert_eq!(*fresh, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_loading_flag_distinguishes_empty_from_unloaded() {
        let (cache, _clock) = cache_with_clock();
        assert!(!cache.is_loaded());

        let value = cache.get_with(|| async { Some(Vec::new()) }).await;
        assert!(value.is_empty());
        assert!(cache.is_loaded());
    }
}

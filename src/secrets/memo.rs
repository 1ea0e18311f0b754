//! Keyed, expiring, single-flight memoization.
//!
//! Concurrent callers asking for the same missing or expired key share one build.
//! A failed build re-stamps the previous value, which is then served for another
//! TTL. Without a previous value the failure itself is remembered for one TTL, so
//! a failing backend is asked at most once per TTL and key.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

type BuildResult<V, E> = std::result::Result<Arc<V>, Arc<E>>;
type SharedBuild<V, E> = Shared<BoxFuture<'static, BuildResult<V, E>>>;

enum Pending<V, E> {
    Ready(BuildResult<V, E>),
    Running(SharedBuild<V, E>),
}

#[derive(Debug)]
struct MemoEntry<V> {
    value: Arc<V>,
    cached_at: Instant,
}

impl<V> MemoEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() >= ttl
    }
}

/// Memo of values keyed by `K`, each valid for `ttl` after it was built
pub struct ExpiringMemo<K, V, E> {
    entries: Arc<DashMap<K, MemoEntry<V>>>,
    failures: Arc<DashMap<K, MemoEntry<E>>>,
    in_flight: Arc<DashMap<K, SharedBuild<V, E>>>,
    ttl: Duration,
}

impl<K, V, E> ExpiringMemo<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            failures: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The stored value for `key` if it has not expired
    pub fn get_fresh(&self, key: &K) -> Option<Arc<V>> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| Arc::clone(&entry.value))
    }

    /// The failure of the last build for `key` if it happened within the TTL and
    /// there was no value to fall back on
    pub fn recent_failure(&self, key: &K) -> Option<Arc<E>> {
        self.failures
            .get(key)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| Arc::clone(&entry.value))
    }

    /// The last successfully built value for `key`, expired or not
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).map(|entry| Arc::clone(&entry.value))
    }

    /// Return the fresh value for `key`, or run `build` to produce one.
    ///
    /// At most one build per key runs at a time; callers arriving while it runs
    /// await the same outcome. `build` is not called when a fresh value or a recent
    /// failure exists, or a build is already in flight.
    pub async fn get_or_build<F, Fut>(&self, key: K, build: F) -> BuildResult<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        if let Some(value) = self.get_fresh(&key) {
            return Ok(value);
        }
        if let Some(error) = self.recent_failure(&key) {
            return Err(error);
        }

        match self.start_or_join(key, build) {
            Pending::Ready(result) => result,
            Pending::Running(shared) => shared.await,
        }
    }

    fn start_or_join<F, Fut>(&self, key: K, build: F) -> Pending<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(running) => Pending::Running(running.get().clone()),
            Entry::Vacant(slot) => {
                // A build may have finished between the first check and taking the slot
                if let Some(value) = self.get_fresh(&key) {
                    return Pending::Ready(Ok(value));
                }
                if let Some(error) = self.recent_failure(&key) {
                    return Pending::Ready(Err(error));
                }

                let entries = Arc::clone(&self.entries);
                let failures = Arc::clone(&self.failures);
                let in_flight = Arc::clone(&self.in_flight);
                let pending = build();

                let shared = async move {
                    let result = match pending.await {
                        Ok(value) => {
                            let value = Arc::new(value);
                            entries.insert(
                                key.clone(),
                                MemoEntry { value: Arc::clone(&value), cached_at: Instant::now() },
                            );
                            failures.remove(&key);
                            Ok(value)
                        }
                        Err(error) => {
                            let error = Arc::new(error);
                            match entries.get_mut(&key) {
                                Some(mut previous) => previous.cached_at = Instant::now(),
                                None => {
                                    failures.insert(
                                        key.clone(),
                                        MemoEntry { value: Arc::clone(&error), cached_at: Instant::now() },
                                    );
                                }
                            }
                            Err(error)
                        }
                    };
                    in_flight.remove(&key);
                    result
                }
                .boxed()
                .shared();

                slot.insert(shared.clone());
                Pending::Running(shared)
            }
        }
    }

    /// Drop the stored value and any remembered failure for `key`; the next lookup
    /// rebuilds
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
        self.failures.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.failures.clear();
    }

    /// Number of stored values, including expired ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V, E> std::fmt::Debug for ExpiringMemo<K, V, E>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringMemo")
            .field("entries", &self.entries.len())
            .field("failures", &self.failures.len())
            .field("in_flight", &self.in_flight.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Memo = ExpiringMemo<String, String, String>;

    #[tokio::test]
    async fn test_builds_once_within_ttl() {
        let memo = Memo::new(Duration::from_secs(60));
        let builds = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&builds);
            let value = memo
                .get_or_build("k".to_string(), move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("v".to_string())
                })
                .await
                .unwrap();
            assert_eq!(*value, "v");
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(memo.len(), 1);
    }

    #[tokio::test]
    async fn test_rebuilds_after_expiry() {
        let memo = Memo::new(Duration::from_millis(20));
        let builds = Arc::new(AtomicUsize::new(0));

        let build = |counter: Arc<AtomicUsize>| {
            move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(format!("v{}", n))
            }
        };

        let first = memo.get_or_build("k".to_string(), build(Arc::clone(&builds))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(memo.get_fresh(&"k".to_string()).is_none());
        assert_eq!(memo.peek(&"k".to_string()).as_deref(), Some(&"v0".to_string()));

        let second = memo.get_or_build("k".to_string(), build(Arc::clone(&builds))).await.unwrap();
        assert_eq!(*first, "v0");
        assert_eq!(*second, "v1");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_build() {
        let memo = Arc::new(Memo::new(Duration::from_secs(60)));
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let memo = Arc::clone(&memo);
            let counter = Arc::clone(&builds);
            handles.push(tokio::spawn(async move {
                memo.get_or_build("k".to_string(), move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, String>("v".to_string())
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(*handle.await.unwrap().unwrap(), "v");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_keeps_previous_value() {
        let memo = Memo::new(Duration::from_millis(10));
        memo.get_or_build("k".to_string(), || async { Ok::<_, String>("old".to_string()) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = memo
            .get_or_build("k".to_string(), || async { Err::<String, _>("boom".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(*err, "boom");
        assert_eq!(memo.peek(&"k".to_string()).as_deref(), Some(&"old".to_string()));

        // Re-stamped: served for another TTL without asking the failing builder
        let served = memo
            .get_or_build("k".to_string(), || async { Err::<String, _>("again".to_string()) })
            .await
            .unwrap();
        assert_eq!(*served, "old");
    }

    #[tokio::test]
    async fn test_failure_without_previous_value_is_remembered_for_ttl() {
        let memo = Memo::new(Duration::from_millis(30));
        let builds = Arc::new(AtomicUsize::new(0));

        let failing = |counter: Arc<AtomicUsize>| {
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>("down".to_string())
            }
        };

        for _ in 0..3 {
            let err = memo.get_or_build("k".to_string(), failing(Arc::clone(&builds))).await.unwrap_err();
            assert_eq!(*err, "down");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(memo.is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(memo.recent_failure(&"k".to_string()).is_none());
        let value = memo
            .get_or_build("k".to_string(), || async { Ok::<_, String>("up".to_string()) })
            .await
            .unwrap();
        assert_eq!(*value, "up");
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forgets_failure() {
        let memo = Memo::new(Duration::from_secs(60));
        memo.get_or_build("k".to_string(), || async { Err::<String, _>("down".to_string()) })
            .await
            .unwrap_err();
        memo.invalidate(&"k".to_string());

        let value = memo
            .get_or_build("k".to_string(), || async { Ok::<_, String>("up".to_string()) })
            .await
            .unwrap();
        assert_eq!(*value, "up");
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let memo = Memo::new(Duration::from_secs(60));
        for key in ["a", "b"] {
            memo.get_or_build(key.to_string(), || async { Ok::<_, String>("v".to_string()) })
                .await
                .unwrap();
        }
        memo.invalidate(&"a".to_string());
        assert!(memo.peek(&"a".to_string()).is_none());
        assert_eq!(memo.len(), 1);

        memo.clear();
        assert!(memo.is_empty());
    }
}

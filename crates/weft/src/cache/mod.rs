//! Bounded least-recently-used caches.
//!
//! [`BoundedCache`] is the shared engine behind the parse-tree, query, and
//! highlight caches. Reads and inserts go straight to a concurrent map; only
//! eviction passes take the eviction lock, so a pass stalls nobody but other
//! passes.
//!
//! ## Eviction
//!
//! - **Capacity**: an insert that pushes the entry count over capacity
//!   schedules a pass on the tokio blocking pool (inline when no runtime is
//!   running). The pass sorts a snapshot by access tick and removes the
//!   overflow, oldest first.
//! - **Staleness**: a background sweeper removes entries idle for longer than
//!   `stale_after`, independent of capacity. It holds only a weak reference
//!   and stops when the cache is dropped.
//!
//! Payloads are handed out as `Arc<V>`. Removing an entry drops the cache's
//! reference once; the payload itself is released when the last reader lets
//! go of it. A reader that loses a race with eviction simply sees a miss.

pub mod query;
pub mod tree;

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub use query::{CompiledQuery, QueryCache, QueryKey};
pub use tree::{ParsedTree, TreeCache, TreeKey};

/// Capacity and staleness settings for one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Maximum number of entries kept after an eviction pass
    pub capacity: usize,
    /// Entries idle longer than this are swept
    pub stale_after: Duration,
    /// How often the sweeper runs; zero disables it
    pub sweep_interval: Duration,
}

impl CacheSettings {
    /// Settings with the default staleness window (1 hour, swept every 5 minutes).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            stale_after: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

struct Slot<V> {
    value: Arc<V>,
    tick: AtomicU64,
    touched_ms: AtomicU64,
}

struct Inner<K, V> {
    name: &'static str,
    entries: DashMap<K, Slot<V>>,
    capacity: usize,
    clock: AtomicU64,
    epoch: Instant,
    evicting: Mutex<()>,
    eviction_scheduled: AtomicBool,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn touch(&self, slot: &Slot<V>) {
        slot.tick
            .store(self.clock.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
        slot.touched_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    fn evict_overflow(&self) -> Vec<K> {
        let _pass = self.evicting.lock();
        let overflow = self.entries.len().saturating_sub(self.capacity);
        if overflow == 0 {
            return Vec::new();
        }

        let mut snapshot: Vec<(K, u64)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.tick.load(Ordering::Relaxed)))
            .collect();
        snapshot.sort_unstable_by_key(|(_, tick)| *tick);

        let evicted: Vec<K> = snapshot
            .into_iter()
            .take(overflow)
            .filter_map(|(key, _)| self.entries.remove(&key).map(|(key, _)| key))
            .collect();
        debug!(cache = self.name, evicted = evicted.len(), "evicted overflow");
        evicted
    }

    fn evict_stale(&self, max_idle: Duration) -> Vec<K> {
        let _pass = self.evicting.lock();
        let now = self.now_ms();
        let max_idle = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);

        let stale: Vec<K> = self
            .entries
            .iter()
            .filter(|entry| now.saturating_sub(entry.touched_ms.load(Ordering::Relaxed)) > max_idle)
            .map(|entry| entry.key().clone())
            .collect();

        let evicted: Vec<K> = stale
            .into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|(key, _)| key))
            .collect();
        if !evicted.is_empty() {
            debug!(cache = self.name, evicted = evicted.len(), "swept stale entries");
        }
        evicted
    }

    fn schedule_eviction(self: &Arc<Self>) {
        if self.eviction_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(self);
                handle.spawn_blocking(move || {
                    inner.eviction_scheduled.store(false, Ordering::Release);
                    inner.evict_overflow();
                });
            }
            Err(_) => {
                self.eviction_scheduled.store(false, Ordering::Release);
                self.evict_overflow();
            }
        }
    }
}

/// Concurrent bounded LRU cache handing out shared payloads.
pub struct BoundedCache<K, V> {
    inner: Arc<Inner<K, V>>,
    sweeper: CancellationToken,
}

impl<K: Eq + Hash, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("name", &self.inner.name)
            .field("len", &self.inner.entries.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a cache. The staleness sweeper starts when a tokio runtime is
    /// available and the sweep interval is non-zero; otherwise call
    /// [`evict_stale`](Self::evict_stale) manually.
    #[must_use]
    pub fn new(name: &'static str, settings: CacheSettings) -> Self {
        let cache = Self {
            inner: Arc::new(Inner {
                name,
                entries: DashMap::new(),
                capacity: settings.capacity,
                clock: AtomicU64::new(0),
                epoch: Instant::now(),
                evicting: Mutex::new(()),
                eviction_scheduled: AtomicBool::new(false),
            }),
            sweeper: CancellationToken::new(),
        };
        if let Ok(handle) = Handle::try_current()
            && !settings.sweep_interval.is_zero()
        {
            handle.spawn(sweep(
                Arc::downgrade(&cache.inner),
                cache.sweeper.clone(),
                settings.sweep_interval,
                settings.stale_after,
            ));
        }
        cache
    }

    /// Look up `key`, refreshing its recency.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let slot = self.inner.entries.get(key)?;
        self.inner.touch(&slot);
        Some(Arc::clone(&slot.value))
    }

    /// Insert or replace `key`, returning the shared payload.
    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let slot = Slot {
            value: Arc::clone(&value),
            tick: AtomicU64::new(0),
            touched_ms: AtomicU64::new(0),
        };
        self.inner.touch(&slot);
        self.inner.entries.insert(key, slot);

        if self.inner.entries.len() > self.inner.capacity {
            trace!(cache = self.inner.name, "over capacity, scheduling eviction");
            self.inner.schedule_eviction();
        }
        value
    }

    /// Return the cached payload for `key`, building and inserting it on a miss.
    ///
    /// `build` runs without any cache lock held; concurrent misses may both
    /// build, and the later insert wins.
    ///
    /// # Errors
    ///
    /// Propagates the error from `build`; nothing is inserted then.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        build: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = build()?;
        Ok(self.insert(key, value))
    }

    /// Remove `key`, returning its payload.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.inner.entries.remove(key).map(|(_, slot)| slot.value)
    }

    /// Returns `true` if `key` is cached. Does not refresh recency.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Number of cached entries. May briefly exceed capacity.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let _pass = self.inner.evicting.lock();
        self.inner.entries.clear();
    }

    /// Run a capacity pass now, returning the evicted keys oldest first.
    pub fn evict_overflow(&self) -> Vec<K> {
        self.inner.evict_overflow()
    }

    /// Run a staleness pass now, returning the evicted keys.
    pub fn evict_stale(&self, max_idle: Duration) -> Vec<K> {
        self.inner.evict_stale(max_idle)
    }
}

impl<K, V> Drop for BoundedCache<K, V> {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

async fn sweep<K, V>(
    inner: Weak<Inner<K, V>>,
    stop: CancellationToken,
    interval: Duration,
    stale_after: Duration,
) where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.evict_stale(stale_after);
            }
        }
    }
}

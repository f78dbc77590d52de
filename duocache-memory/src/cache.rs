//! # Memory Cache
//!
//! Purpose: the bounded, concurrent LRU described in spec §4.1 — count,
//! cost, and age limits enforced independently, reads and writes
//! serialised through a short-held lock, and eviction destructors kept off
//! that lock via [`crate::destroyer::Destroyer`].
//!
//! `MemoryCache<K, V>` is a cheap-to-clone handle (an `Arc` under the
//! hood), matching the source's pool-handle pattern: cloning shares state,
//! and the background auto-trim timer holds only a `Weak` so it never
//! keeps the cache alive past its last strong reference.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::auto_trim;
use crate::config::MemoryCacheConfig;
use crate::destroyer::Destroyer;
use crate::node::LinkedMap;
use crate::signals::PlatformSignals;

/// Shared state behind a [`MemoryCache`] handle.
pub(crate) struct CacheInner<K, V> {
    map: Mutex<LinkedMap<K, V>>,
    pub(crate) config: MemoryCacheConfig<V>,
    destroyer: Destroyer<V>,
    torn_down: AtomicBool,
}

/// A bounded, thread-safe LRU cache of opaque owned values.
///
/// Reads and writes serialise on a short-held lock (§5); trims use a
/// non-blocking try-lock loop so a large trim never blocks a concurrent
/// reader or writer for longer than one eviction.
pub struct MemoryCache<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for MemoryCache<K, V> {
    fn clone(&self) -> Self {
        MemoryCache {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache with default configuration (unbounded count/cost/age,
    /// a 5 second auto-trim interval, both platform-signal clears on).
    pub fn new() -> Self {
        Self::with_config(MemoryCacheConfig::default())
    }

    /// Creates a cache with caller-supplied bounds, timers, and destruction
    /// policy.
    pub fn with_config(config: MemoryCacheConfig<V>) -> Self {
        let destroyer = Destroyer::new(config.destruction_executor.clone());
        let interval = config.auto_trim_interval;
        let inner = Arc::new(CacheInner {
            map: Mutex::new(LinkedMap::new()),
            config,
            destroyer,
            torn_down: AtomicBool::new(false),
        });
        auto_trim::spawn(Arc::downgrade(&inner), interval);
        MemoryCache { inner }
    }

    /// Subscribes to a host-provided platform signal source so low-memory
    /// and background-transition notifications reach this cache (spec §4.1,
    /// §5).
    pub fn attach_signals(&self, signals: Arc<dyn PlatformSignals>) {
        let on_memory = self.clone();
        signals.on_memory_pressure(Arc::new(move || on_memory.handle_memory_pressure()));
        let on_background = self.clone();
        signals.on_background(Arc::new(move || on_background.handle_background()));
    }

    fn handle_memory_pressure(&self) {
        if let Some(callback) = &self.inner.config.on_memory_warning {
            callback();
        }
        if self.inner.config.clear_on_memory_warning {
            self.remove_all();
        }
    }

    fn handle_background(&self) {
        if let Some(callback) = &self.inner.config.on_background {
            callback();
        }
        if self.inner.config.clear_on_background {
            self.remove_all();
        }
    }

    /// Looks up `key` without reordering the LRU list.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.map.lock().contains(key)
    }

    /// Looks up `key`, moving it to the most-recently-used position on hit.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.map.lock().get_and_touch(key).cloned()
    }

    /// Inserts or replaces `key`. If the resulting total cost exceeds
    /// `cost_limit`, a cost trim is scheduled on a background thread; if the
    /// resulting total count exceeds `count_limit`, the new eviction victim
    /// is evicted in-line before `set` returns.
    pub fn set(&self, key: K, value: V, cost: u64) {
        let (total_cost, total_count) = {
            let mut map = self.inner.map.lock();
            map.set(key, value, cost);
            (map.total_cost(), map.total_count())
        };

        if total_cost > self.inner.config.cost_limit {
            self.spawn_background_trim(TrimKind::Cost);
        }

        if total_count > self.inner.config.count_limit {
            let victim = self.inner.map.lock().pop_tail();
            if let Some((_, value)) = victim {
                self.inner.destroyer.destroy(vec![value]);
            }
        }
    }

    /// Removes `key`. The evicted value's destructor runs per the
    /// configured [`crate::config::DestructionExecutor`], not inline.
    pub fn remove(&self, key: &K) {
        let removed = self.inner.map.lock().remove(key);
        if let Some(value) = removed {
            self.inner.destroyer.destroy(vec![value]);
        }
    }

    /// Evicts every entry. Constant-time at the call site: the map is
    /// swapped out under the lock and destructors run off-lock.
    pub fn remove_all(&self) {
        let drained = self.inner.map.lock().drain_all();
        self.inner.destroyer.destroy(drained);
    }

    /// Marks the cache torn down. Idempotent; mainly useful for embedders
    /// that want an explicit teardown point distinct from dropping the last
    /// handle.
    pub fn teardown(&self) {
        self.inner.torn_down.store(true, Ordering::Release);
        self.remove_all();
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::Acquire)
    }

    /// Best-effort eviction down to `limit` entries, evicting the
    /// least-recently-used entry first. See spec §4.1's limit-relative trim
    /// protocol.
    pub fn trim_to_count(&self, limit: usize) {
        self.inner.trim_to_count(limit);
    }

    /// Best-effort eviction down to a total cost of `limit`.
    pub fn trim_to_cost(&self, limit: u64) {
        self.inner.trim_to_cost(limit);
    }

    /// Best-effort eviction of every entry whose age exceeds `age`.
    pub fn trim_to_age(&self, age: Duration) {
        self.inner.trim_to_age(age);
    }

    fn spawn_background_trim(&self, kind: TrimKind) {
        let cache = self.clone();
        std::thread::spawn(move || match kind {
            TrimKind::Cost => cache.trim_to_cost(cache.inner.config.cost_limit),
            TrimKind::Count => cache.trim_to_count(cache.inner.config.count_limit),
            TrimKind::Age => {
                if let Some(age) = cache.inner.config.age_limit {
                    cache.trim_to_age(age);
                }
            }
        });
    }

    pub fn total_count(&self) -> usize {
        self.inner.map.lock().total_count()
    }

    pub fn total_cost(&self) -> u64 {
        self.inner.map.lock().total_cost()
    }

    pub fn count_limit(&self) -> usize {
        self.inner.config.count_limit
    }

    pub fn cost_limit(&self) -> u64 {
        self.inner.config.cost_limit
    }

    pub fn age_limit(&self) -> Option<Duration> {
        self.inner.config.age_limit
    }

    pub fn auto_trim_interval(&self) -> Duration {
        self.inner.config.auto_trim_interval
    }

    pub fn clear_on_memory_warning(&self) -> bool {
        self.inner.config.clear_on_memory_warning
    }

    pub fn clear_on_background(&self) -> bool {
        self.inner.config.clear_on_background
    }
}

impl<K, V> Default for MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
enum TrimKind {
    Cost,
    Count,
    Age,
}

impl<K, V> CacheInner<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Shared limit-relative trim protocol (spec §4.1): short-circuit on a
    /// zero limit or an already-satisfied bound, then loop acquiring the
    /// lock non-blockingly, evicting one victim per acquisition, and
    /// sleeping briefly between attempts so the lock is never held across
    /// the whole trim.
    fn run_trim(&self, zero_limit: bool, mut over_limit: impl FnMut(&LinkedMap<K, V>) -> bool) {
        {
            let mut map = self.map.lock();
            if zero_limit {
                let drained = map.drain_all();
                drop(map);
                self.destroyer.destroy(drained);
                return;
            }
            if !over_limit(&map) {
                return;
            }
        }

        let mut evicted = Vec::new();
        loop {
            match self.map.try_lock() {
                Some(mut map) => {
                    if map.peek_tail().is_none() || !over_limit(&map) {
                        break;
                    }
                    if let Some((_, value)) = map.pop_tail() {
                        evicted.push(value);
                    }
                }
                None => std::thread::sleep(Duration::from_millis(10)),
            }
        }

        self.destroyer.destroy(evicted);
    }

    pub(crate) fn trim_to_count(&self, limit: usize) {
        self.run_trim(limit == 0, |map| map.total_count() > limit);
    }

    pub(crate) fn trim_to_cost(&self, limit: u64) {
        self.run_trim(limit == 0, |map| map.total_cost() > limit);
    }

    pub(crate) fn trim_to_age(&self, age: Duration) {
        self.run_trim(age.is_zero(), |map| {
            map.peek_tail()
                .map(|node| node.access_time.elapsed() > age)
                .unwrap_or(false)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DestructionExecutor;

    fn inline_cache<V: Clone + Send + Sync + 'static>() -> MemoryCache<&'static str, V> {
        MemoryCache::with_config(MemoryCacheConfig {
            destruction_executor: DestructionExecutor::Inline,
            ..MemoryCacheConfig::default()
        })
    }

    #[test]
    fn s1_memory_lru_count_limit() {
        let cache = MemoryCache::with_config(MemoryCacheConfig {
            count_limit: 2,
            destruction_executor: DestructionExecutor::Inline,
            ..MemoryCacheConfig::default()
        });
        cache.set("a", "A", 0);
        cache.set("b", "B", 0);
        cache.set("c", "C", 0);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some("B"));
        assert_eq!(cache.get(&"c"), Some("C"));
    }

    #[test]
    fn access_promotes_survivors() {
        let cache = inline_cache::<&'static str>();
        cache.set("a", "A", 0);
        cache.set("b", "B", 0);
        cache.set("c", "C", 0);
        cache.get(&"a");
        cache.trim_to_count(2);
        assert!(cache.contains(&"a"));
        assert!(cache.contains(&"c"));
        assert!(!cache.contains(&"b"));
    }

    #[test]
    fn cost_trim_respects_heterogeneous_costs() {
        let cache = inline_cache::<&'static str>();
        cache.set("a", "A", 4);
        cache.set("b", "B", 4);
        cache.set("c", "C", 4);
        cache.trim_to_cost(10);
        assert!(cache.total_cost() <= 10);
    }

    #[test]
    fn age_trim_evicts_stale_entries() {
        let cache = inline_cache::<&'static str>();
        cache.set("k", "V", 0);
        std::thread::sleep(Duration::from_millis(20));
        cache.trim_to_age(Duration::from_millis(5));
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn round_trip_set_then_get() {
        let cache = inline_cache::<&'static str>();
        cache.set("k", "v", 0);
        assert_eq!(cache.get(&"k"), Some("v"));
    }

    #[test]
    fn idempotent_remove() {
        let cache = inline_cache::<&'static str>();
        cache.set("k", "v", 0);
        cache.remove(&"k");
        cache.remove(&"k");
        assert!(!cache.contains(&"k"));
    }

    #[test]
    fn clear_is_total() {
        let cache = inline_cache::<&'static str>();
        cache.set("a", "A", 1);
        cache.set("b", "B", 1);
        cache.remove_all();
        assert_eq!(cache.total_count(), 0);
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn trim_to_count_zero_clears_everything() {
        let cache = inline_cache::<&'static str>();
        cache.set("a", "A", 1);
        cache.set("b", "B", 1);
        cache.trim_to_count(0);
        assert_eq!(cache.total_count(), 0);
    }
}

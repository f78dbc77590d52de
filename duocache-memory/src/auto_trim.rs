//! # Background Auto-Trim Timer
//!
//! Purpose: run the three trims (cost, count, age) on a fixed interval so a
//! cache that never calls `set` past its limits still drains slack, and so
//! age-based eviction happens even without new writes. Expressed as a
//! sleeping worker thread holding a weak reference, per the design notes'
//! "periodic scheduled task on the cache's background executor" — when the
//! cache is dropped the next wakeup's `upgrade()` fails and the thread
//! exits on its own, so no explicit teardown call is required.

use std::sync::Weak;
use std::time::Duration;

use crate::cache::CacheInner;

pub(crate) fn spawn<K, V>(inner: Weak<CacheInner<K, V>>, interval: Duration)
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let interval = if interval.is_zero() {
        Duration::from_millis(1)
    } else {
        interval
    };

    std::thread::Builder::new()
        .name("duocache-auto-trim".into())
        .spawn(move || loop {
            std::thread::sleep(interval);
            let Some(cache) = inner.upgrade() else {
                return;
            };
            cache.trim_to_cost(cache.config.cost_limit);
            cache.trim_to_count(cache.config.count_limit);
            if let Some(age) = cache.config.age_limit {
                cache.trim_to_age(age);
            }
        })
        .expect("spawn auto-trim thread");
}

//! # Two-Tier Cache Facade
//!
//! Purpose: unify the memory and disk tiers behind one read-through,
//! write-through API (design §4.4). A `get` checks memory first and, on a
//! disk hit, promotes the value back into memory before returning it; a
//! `set` writes both tiers so a later `get` never has to fall through to
//! disk for data just written. Every sync method has an async sibling that
//! runs the same call on a blocking-pool thread via
//! [`tokio::task::spawn_blocking`] and reports its result through a
//! completion callback, rather than an `async fn`, since the underlying
//! work (a mutex-guarded SQLite call) is blocking, not `.await`-friendly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use duocache_common::CacheResult;
use duocache_disk::DiskCache;
use duocache_memory::MemoryCache;

use crate::config::CacheConfig;

/// A two-tier key-value cache: a bounded in-process LRU in front of a
/// SQLite-backed persistent store.
#[derive(Clone)]
pub struct Cache {
    name: String,
    memory: MemoryCache<String, Vec<u8>>,
    disk: Arc<DiskCache>,
}

impl Cache {
    /// Opens a cache named `name`, rooted under the platform cache
    /// directory (`dirs::cache_dir()/duocache/<name>`). Two `by_name`
    /// calls with the same name share the same on-disk files but not the
    /// same in-process memory tier.
    pub fn by_name(name: impl Into<String>, config: CacheConfig) -> CacheResult<Self> {
        let name = name.into();
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self::by_path(base.join("duocache").join(&name), name, config)
    }

    /// Opens a cache rooted at an explicit directory, for callers that
    /// manage their own cache locations instead of using the platform
    /// default.
    pub fn by_path(
        root: impl Into<PathBuf>,
        name: impl Into<String>,
        config: CacheConfig,
    ) -> CacheResult<Self> {
        let inline_threshold = config.disk_inline_threshold;
        let memory = MemoryCache::with_config(config.into_memory_config());
        let disk = DiskCache::open(root, inline_threshold)?;
        Ok(Cache {
            name: name.into(),
            memory,
            disk: Arc::new(disk),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn memory_cache(&self) -> &MemoryCache<String, Vec<u8>> {
        &self.memory
    }

    pub fn disk_cache(&self) -> &DiskCache {
        &self.disk
    }

    pub fn root(&self) -> &Path {
        self.disk.root()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.memory.contains(&key.to_string()) || self.disk.contains(key)
    }

    /// Reads `key`, checking memory first. A disk hit is promoted back
    /// into memory before it is returned, so the next read for the same
    /// key is served from memory.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(value) = self.memory.get(&key.to_string()) {
            return Some(value);
        }
        let value = self.disk.get(key)?;
        let cost = value.len() as u64;
        self.memory.set(key.to_string(), value.clone(), cost);
        Some(value)
    }

    /// Writes `key` to both tiers, memory first then disk (spec §5
    /// ordering). Returns whether the disk write succeeded; the memory
    /// tier's `set` cannot itself fail.
    pub fn set(&self, key: &str, value: Vec<u8>) -> bool {
        let cost = value.len() as u64;
        self.memory.set(key.to_string(), value.clone(), cost);
        self.disk.set(key, &value)
    }

    /// Removes `key` from both tiers. Returns whether the key was present
    /// in either one.
    pub fn remove(&self, key: &str) -> bool {
        let was_in_memory = self.memory.contains(&key.to_string());
        self.memory.remove(&key.to_string());
        let was_in_disk = self.disk.contains(key);
        self.disk.remove(key);
        was_in_memory || was_in_disk
    }

    pub fn remove_all(&self) {
        self.memory.remove_all();
        self.disk.remove_all();
    }

    pub fn remove_all_with_progress(&self, progress: impl Fn(u64, u64), end: impl FnOnce(bool)) {
        self.memory.remove_all();
        self.disk.remove_all_with_progress(progress, end);
    }

    // --- async siblings -----------------------------------------------
    //
    // Each dispatches the sync call onto the blocking thread pool and
    // delivers its result through a completion callback, matching design
    // §4.4: `contains`/`get`/`remove` callbacks carry the key back alongside
    // the result (the caller may have several of these in flight at once);
    // `set` completes with no arguments; `remove_all` gets a progress/end
    // pair rather than a single completion.

    pub fn contains_async(
        &self,
        key: impl Into<String>,
        on_done: impl FnOnce(String, bool) + Send + 'static,
    ) {
        let cache = self.clone();
        let key = key.into();
        tokio::task::spawn_blocking(move || {
            let present = cache.contains(&key);
            on_done(key, present);
        });
    }

    pub fn get_async(
        &self,
        key: impl Into<String>,
        on_done: impl FnOnce(String, Option<Vec<u8>>) + Send + 'static,
    ) {
        let cache = self.clone();
        let key = key.into();
        tokio::task::spawn_blocking(move || {
            let value = cache.get(&key);
            on_done(key, value);
        });
    }

    pub fn set_async(
        &self,
        key: impl Into<String>,
        value: Vec<u8>,
        on_done: impl FnOnce() + Send + 'static,
    ) {
        let cache = self.clone();
        let key = key.into();
        tokio::task::spawn_blocking(move || {
            cache.set(&key, value);
            on_done();
        });
    }

    pub fn remove_async(&self, key: impl Into<String>, on_done: impl FnOnce(String) + Send + 'static) {
        let cache = self.clone();
        let key = key.into();
        tokio::task::spawn_blocking(move || {
            cache.remove(&key);
            on_done(key);
        });
    }

    pub fn remove_all_async(
        &self,
        progress: impl Fn(u64, u64) + Send + 'static,
        end: impl FnOnce(bool) + Send + 'static,
    ) {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || {
            cache.remove_all_with_progress(progress, end);
        });
    }
}

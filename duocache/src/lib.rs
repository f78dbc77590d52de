//! # duocache
//!
//! A two-tier key-value cache: a bounded in-process LRU memory tier
//! (`duocache-memory`) in front of a SQLite-backed persistent tier
//! (`duocache-disk`), unified behind one read-through, write-through
//! facade with both sync and async (completion-callback) entry points.
//! See [`cache::Cache`].

pub mod cache;
pub mod config;

pub use cache::Cache;
pub use config::CacheConfig;

pub use duocache_common::{CacheError, CacheResult};
pub use duocache_disk::{DiskCache, KVStorageItem, KVStorageItemInfo, ValueWithExtendedData};
pub use duocache_memory::{DestructionExecutor, MemoryCache, MemoryCacheConfig, PlatformSignals};

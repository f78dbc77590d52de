//! # Facade Configuration
//!
//! Purpose: the knobs a caller sets once at construction, split into the
//! pieces each tier actually wants — a memory-tier config is handed
//! straight to [`duocache_memory::MemoryCacheConfig`]; the disk-tier knob
//! is just the inline threshold [`duocache_disk::DiskCache::open`] needs.

use std::time::Duration;

use duocache_memory::{DestructionExecutor, MemoryCacheConfig};

/// Construction-time configuration for a [`crate::cache::Cache`].
#[derive(Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held in the memory tier.
    pub memory_count_limit: usize,
    /// Maximum aggregate cost (typically byte size) held in the memory
    /// tier; `u64::MAX` disables cost-based eviction.
    pub memory_cost_limit: u64,
    /// Entries older than this are evicted from the memory tier on the
    /// next trim; `None` disables age-based eviction.
    pub memory_age_limit: Option<Duration>,
    /// How often the memory tier's background trim runs.
    pub memory_auto_trim_interval: Duration,
    /// Where evicted memory-tier values are dropped.
    pub memory_destruction_executor: DestructionExecutor<Vec<u8>>,
    /// Clear the memory tier on a host low-memory signal.
    pub clear_memory_on_pressure: bool,
    /// Clear the memory tier when the host signals a background
    /// transition.
    pub clear_memory_on_background: bool,
    /// Values no larger than this many bytes are stored inline in the
    /// disk tier's manifest; larger values are externalized to a file.
    /// `0` always externalizes, `usize::MAX` always inlines.
    pub disk_inline_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let memory_defaults = MemoryCacheConfig::<Vec<u8>>::default();
        CacheConfig {
            memory_count_limit: memory_defaults.count_limit,
            memory_cost_limit: memory_defaults.cost_limit,
            memory_age_limit: memory_defaults.age_limit,
            memory_auto_trim_interval: memory_defaults.auto_trim_interval,
            memory_destruction_executor: memory_defaults.destruction_executor,
            clear_memory_on_pressure: memory_defaults.clear_on_memory_warning,
            clear_memory_on_background: memory_defaults.clear_on_background,
            disk_inline_threshold: 4096,
        }
    }
}

impl CacheConfig {
    pub(crate) fn into_memory_config(self) -> MemoryCacheConfig<Vec<u8>> {
        MemoryCacheConfig {
            count_limit: self.memory_count_limit,
            cost_limit: self.memory_cost_limit,
            age_limit: self.memory_age_limit,
            auto_trim_interval: self.memory_auto_trim_interval,
            destruction_executor: self.memory_destruction_executor,
            clear_on_memory_warning: self.clear_memory_on_pressure,
            clear_on_background: self.clear_memory_on_background,
            on_memory_warning: None,
            on_background: None,
        }
    }
}

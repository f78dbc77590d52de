//! # Memory Cache Configuration
//!
//! Purpose: collect the bounds, timers, and callbacks enumerated in spec
//! §4.1 into one struct so `MemoryCache::with_config` has a single entry
//! point, matching the source's preference for an explicit config struct
//! over a long constructor argument list.

use std::sync::Arc;
use std::time::Duration;

/// Where an evicted value's destructor runs.
///
/// The design notes call for this to be an injected interface rather than
/// a global flag, since embedders may cache values with expensive
/// destructors (decoded images, GPU handles) that must not run on a
/// latency-sensitive thread.
#[derive(Clone)]
pub enum DestructionExecutor<V> {
    /// Run destructors synchronously on whichever thread triggered the
    /// eviction. Only safe when values are cheap to drop.
    Inline,
    /// Hand evicted values to a dedicated background thread.
    Background,
    /// Hand evicted values to a caller-supplied dispatcher, e.g. a UI
    /// event loop's "post to main thread" primitive.
    Custom(Arc<dyn Fn(Vec<V>) + Send + Sync>),
}

impl<V> Default for DestructionExecutor<V> {
    fn default() -> Self {
        DestructionExecutor::Background
    }
}

impl<V> std::fmt::Debug for DestructionExecutor<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestructionExecutor::Inline => f.write_str("DestructionExecutor::Inline"),
            DestructionExecutor::Background => f.write_str("DestructionExecutor::Background"),
            DestructionExecutor::Custom(_) => f.write_str("DestructionExecutor::Custom(..)"),
        }
    }
}

/// Configuration for a [`crate::MemoryCache`].
///
/// Defaults match spec §4.1: unbounded count/cost/age, a 5 second
/// auto-trim interval, and both platform-signal clears enabled.
#[derive(Clone)]
pub struct MemoryCacheConfig<V> {
    pub count_limit: usize,
    pub cost_limit: u64,
    pub age_limit: Option<Duration>,
    pub auto_trim_interval: Duration,
    pub clear_on_memory_warning: bool,
    pub clear_on_background: bool,
    pub destruction_executor: DestructionExecutor<V>,
    pub on_memory_warning: Option<Arc<dyn Fn() + Send + Sync>>,
    pub on_background: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<V> std::fmt::Debug for MemoryCacheConfig<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheConfig")
            .field("count_limit", &self.count_limit)
            .field("cost_limit", &self.cost_limit)
            .field("age_limit", &self.age_limit)
            .field("auto_trim_interval", &self.auto_trim_interval)
            .field("clear_on_memory_warning", &self.clear_on_memory_warning)
            .field("clear_on_background", &self.clear_on_background)
            .field("destruction_executor", &self.destruction_executor)
            .finish()
    }
}

impl<V> Default for MemoryCacheConfig<V> {
    fn default() -> Self {
        MemoryCacheConfig {
            count_limit: usize::MAX,
            cost_limit: u64::MAX,
            age_limit: None,
            auto_trim_interval: Duration::from_secs(5),
            clear_on_memory_warning: true,
            clear_on_background: true,
            destruction_executor: DestructionExecutor::default(),
            on_memory_warning: None,
            on_background: None,
        }
    }
}

//! # duocache-memory
//!
//! A concurrent, bounded LRU cache of opaque owned values (spec §4.1).
//!
//! ## Design Principles
//!
//! 1. **Arena-Backed List**: [`node::LinkedMap`] keeps LRU links as indices
//!    into a dense `Vec`, not heap pointers, so there is no cycle in the
//!    ownership graph and splicing is an index swap.
//! 2. **Short Critical Sections**: every public operation holds the lock
//!    only long enough to mutate the map; destructors for evicted values run
//!    outside the lock via [`destroyer::Destroyer`].
//! 3. **Three Independent Bounds**: count, cost, and age are trimmed by the
//!    same non-blocking try-lock-and-retry protocol so a large trim never
//!    blocks a concurrent reader or writer for more than one eviction.
//! 4. **Injected Destruction And Signals**: where a value's destructor runs
//!    and how platform lifecycle events reach the cache are both
//!    configuration, not global state.

pub mod auto_trim;
pub mod cache;
pub mod config;
pub mod destroyer;
pub mod node;
pub mod signals;

pub use cache::MemoryCache;
pub use config::{DestructionExecutor, MemoryCacheConfig};
pub use node::LinkedMap;
pub use signals::{ChannelSignals, ChannelSignalsHandle, NoSignals, PlatformSignals};

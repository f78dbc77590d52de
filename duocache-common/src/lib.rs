//! # duocache-common
//!
//! Shared error type and storage-type enum used by both the memory and
//! disk tiers, kept dependency-light so either tier can be built without
//! pulling in the other's stack.

pub mod error;
pub mod storage_type;

pub use error::{CacheError, CacheResult};
pub use storage_type::StorageType;

/// Non-empty-key/value validation shared by both tiers.
///
/// Returns `Err` for an empty key or value; both tiers treat this the same
/// way per the design's "invalid argument" error kind.
pub fn require_non_empty(key: &[u8], value: &[u8]) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::invalid("key must not be empty"));
    }
    if value.is_empty() {
        return Err(CacheError::invalid("value must not be empty"));
    }
    Ok(())
}

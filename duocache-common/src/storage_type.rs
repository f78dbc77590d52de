//! # Storage Type
//!
//! Purpose: pick, once per engine instance, whether a payload lives inline
//! in the manifest row or as an external file under `data/`.

/// Discriminates how the KV storage engine stores a value's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// Payload is always an external file; `filename` is required on write.
    File,
    /// Payload is always inline in the manifest; `filename` must be absent.
    Sqlite,
    /// Caller decides per write; presence of `filename` is the discriminator.
    Mixed,
}

impl StorageType {
    /// Selects a storage type from a disk cache's inline threshold, matching
    /// the convention that zero always externalizes and `usize::MAX` always
    /// inlines.
    pub fn from_inline_threshold(threshold: usize) -> Self {
        if threshold == 0 {
            StorageType::File
        } else if threshold == usize::MAX {
            StorageType::Sqlite
        } else {
            StorageType::Mixed
        }
    }
}

//! # Manifest Row Shapes
//!
//! Purpose: the two views a caller gets of a manifest row. [`KVStorageItem`]
//! carries the loaded payload; [`KVStorageItemInfo`] mirrors every column
//! except the payload, for callers that only want metadata.

/// A manifest row together with its payload, returned by
/// [`crate::engine::KvStorageEngine::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KVStorageItem {
    pub key: String,
    pub value: Vec<u8>,
    /// `Some` when the payload lives in an external file under `data/`.
    pub filename: Option<String>,
    pub size: u64,
    pub modification_time: i64,
    pub last_access_time: i64,
    pub extended_data: Option<Vec<u8>>,
}

/// A manifest row without its payload, returned by
/// [`crate::engine::KvStorageEngine::get_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KVStorageItemInfo {
    pub key: String,
    pub filename: Option<String>,
    pub size: u64,
    pub modification_time: i64,
    pub last_access_time: i64,
    pub extended_data: Option<Vec<u8>>,
}

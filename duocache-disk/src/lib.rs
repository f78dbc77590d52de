//! # duocache-disk
//!
//! The persistent cache tier (design §4.2): a SQLite manifest under a
//! per-cache root directory, with payloads either inline in a row or
//! externalized to a file under `data/`, selected by a per-write
//! threshold. [`cache::DiskCache`] is the public entry point;
//! [`engine::KvStorageEngine`] is the manifest/filesystem engine it
//! serialises access to.

pub mod cache;
pub mod engine;
pub mod item;
mod trash;

pub use cache::{DiskCache, ValueWithExtendedData};
pub use engine::KvStorageEngine;
pub use item::{KVStorageItem, KVStorageItemInfo};

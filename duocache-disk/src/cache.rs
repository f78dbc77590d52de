//! # Disk Cache
//!
//! Purpose: a thin, serialising wrapper over [`KvStorageEngine`] that
//! decides, per write, whether a value is small enough to inline or should
//! be externalized to a file, and exposes the byte-level operations the
//! facade needs. A single gate [`parking_lot::Mutex`] stands in for the
//! "binary semaphore around each KV engine call" the design calls for;
//! the engine's own `open` lock still protects the connection itself, but
//! serialising disk-cache call boundaries (rather than letting two writers
//! interleave statements against one logical operation) is a distinct
//! concern from connection safety.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use duocache_common::{CacheResult, StorageType};
use parking_lot::Mutex;

use crate::engine::KvStorageEngine;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Deterministically names an external payload file from its key, using
/// `ahash`'s fixed (non-randomized) default keying so the same key always
/// maps to the same filename across process restarts.
fn filename_for_key(key: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = ahash::AHasher::default();
    key.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// A byte sequence paired with an optional, caller-attached extended-data
/// side record. The design notes prefer this explicit pairing over an
/// identity-keyed side table: callers that want to round-trip their own
/// metadata through a [`DiskCache::set_with_extended`] call build one of
/// these instead of the cache tracking object identity itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueWithExtendedData {
    pub value: Vec<u8>,
    pub extended_data: Option<Vec<u8>>,
}

impl ValueWithExtendedData {
    pub fn new(value: Vec<u8>, extended_data: Option<Vec<u8>>) -> Self {
        ValueWithExtendedData { value, extended_data }
    }
}

/// The persistent cache tier: a SQLite manifest plus a content directory,
/// reached through a single serialising gate.
pub struct DiskCache {
    engine: KvStorageEngine,
    gate: Mutex<()>,
    inline_threshold: usize,
}

impl DiskCache {
    /// Opens (creating if absent) a disk cache rooted at `root`. Values no
    /// larger than `inline_threshold` bytes are stored inline in the
    /// manifest; larger ones are externalized to `data/`. `0` always
    /// externalizes, `usize::MAX` always inlines.
    pub fn open(root: impl Into<PathBuf>, inline_threshold: usize) -> CacheResult<Self> {
        let storage_type = StorageType::from_inline_threshold(inline_threshold);
        let engine = KvStorageEngine::new(root, storage_type)?;
        Ok(DiskCache {
            engine,
            gate: Mutex::new(()),
            inline_threshold,
        })
    }

    pub fn root(&self) -> &Path {
        self.engine.root()
    }

    pub fn inline_threshold(&self) -> usize {
        self.inline_threshold
    }

    fn filename_for(&self, key: &str, value_len: usize) -> Option<String> {
        if value_len > self.inline_threshold {
            Some(filename_for_key(key))
        } else {
            None
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        let _permit = self.gate.lock();
        self.engine.get_info(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let _permit = self.gate.lock();
        self.engine.get(key).map(|item| item.value)
    }

    pub fn get_with_extended(&self, key: &str) -> Option<ValueWithExtendedData> {
        let _permit = self.gate.lock();
        self.engine
            .get(key)
            .map(|item| ValueWithExtendedData::new(item.value, item.extended_data))
    }

    pub fn set(&self, key: &str, value: &[u8]) -> bool {
        let _permit = self.gate.lock();
        let filename = self.filename_for(key, value.len());
        self.engine.save(key, value, filename.as_deref(), None)
    }

    pub fn set_with_extended(&self, key: &str, data: &ValueWithExtendedData) -> bool {
        let _permit = self.gate.lock();
        let filename = self.filename_for(key, data.value.len());
        self.engine.save(
            key,
            &data.value,
            filename.as_deref(),
            data.extended_data.as_deref(),
        )
    }

    pub fn remove(&self, key: &str) -> bool {
        let _permit = self.gate.lock();
        self.engine.remove(key)
    }

    pub fn remove_all(&self) -> bool {
        let _permit = self.gate.lock();
        self.engine.remove_all()
    }

    pub fn remove_all_with_progress(
        &self,
        progress: impl Fn(u64, u64),
        end: impl FnOnce(bool),
    ) -> bool {
        let _permit = self.gate.lock();
        self.engine.remove_all_with_progress(progress, end)
    }

    pub fn count(&self) -> u64 {
        let _permit = self.gate.lock();
        self.engine.count()
    }

    pub fn size(&self) -> u64 {
        let _permit = self.gate.lock();
        self.engine.total_size()
    }

    pub fn trim_to_count(&self, limit: u64) -> bool {
        let _permit = self.gate.lock();
        self.engine.remove_items_to_fit_count(limit)
    }

    pub fn trim_to_size(&self, limit: u64) -> bool {
        let _permit = self.gate.lock();
        self.engine.remove_items_to_fit_size(limit)
    }

    /// Removes every row whose payload has not been accessed within
    /// `max_age`, treating `modification_time` as the relevant timestamp
    /// (the manifest's only persisted staleness clock).
    pub fn trim_to_age(&self, max_age: Duration) -> bool {
        let _permit = self.gate.lock();
        let cutoff = now_unix() - max_age.as_secs() as i64;
        self.engine.remove_items_earlier_than(cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_stay_inline() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), 16).unwrap();
        cache.set("k", b"short");
        assert!(!dir.path().join("data").read_dir().unwrap().next().is_some());
        assert_eq!(cache.get("k"), Some(b"short".to_vec()));
    }

    #[test]
    fn large_values_externalize() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), 4).unwrap();
        cache.set("k", b"a value longer than four bytes");
        assert!(dir.path().join("data").read_dir().unwrap().next().is_some());
        assert_eq!(
            cache.get("k"),
            Some(b"a value longer than four bytes".to_vec())
        );
    }

    #[test]
    fn extended_data_round_trips_through_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), 16).unwrap();
        let data = ValueWithExtendedData::new(b"v".to_vec(), Some(b"meta".to_vec()));
        cache.set_with_extended("k", &data);
        let fetched = cache.get_with_extended("k").unwrap();
        assert_eq!(fetched.extended_data.as_deref(), Some(&b"meta"[..]));
    }

    #[test]
    fn trim_to_count_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), 16).unwrap();
        for i in 0..5 {
            cache.set(&format!("k{i}"), b"v");
        }
        assert!(cache.trim_to_count(2));
        assert_eq!(cache.count(), 2);
    }

    #[test]
    fn remove_all_resets_count_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), 16).unwrap();
        cache.set("k1", b"v");
        cache.set("k2", b"another value that externalizes");
        assert!(cache.remove_all());
        assert_eq!(cache.count(), 0);
        assert_eq!(cache.size(), 0);
    }
}

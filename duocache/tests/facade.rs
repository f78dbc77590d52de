//! End-to-end scenarios against the two-tier facade.

use duocache::{Cache, CacheConfig};

fn open(dir: &tempfile::TempDir, config: CacheConfig) -> Cache {
    Cache::by_path(dir.path(), "test", config).unwrap()
}

#[test]
fn set_then_get_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open(&dir, CacheConfig::default());
    assert!(cache.set("k", b"v".to_vec()));
    assert_eq!(cache.get("k"), Some(b"v".to_vec()));
}

#[test]
fn get_falls_through_to_disk_and_promotes_into_memory() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open(&dir, CacheConfig::default());
    // Write directly to the disk tier, bypassing memory, to simulate a
    // value that fell out of memory but is still on disk.
    cache.disk_cache().set("k", b"from-disk");
    assert!(!cache.memory_cache().contains(&"k".to_string()));

    assert_eq!(cache.get("k"), Some(b"from-disk".to_vec()));
    assert!(cache.memory_cache().contains(&"k".to_string()));
}

#[test]
fn disk_round_trips_across_cache_recreation() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = open(&dir, CacheConfig::default());
        cache.set("k", b"persisted".to_vec());
    }
    let cache = open(&dir, CacheConfig::default());
    assert_eq!(cache.get("k"), Some(b"persisted".to_vec()));
}

#[test]
fn remove_clears_both_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open(&dir, CacheConfig::default());
    cache.set("k", b"v".to_vec());
    assert!(cache.remove("k"));
    assert!(!cache.contains("k"));
    assert!(cache.disk_cache().get("k").is_none());
}

#[test]
fn remove_all_clears_both_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open(&dir, CacheConfig::default());
    cache.set("k1", b"v1".to_vec());
    cache.set("k2", b"v2".to_vec());
    cache.remove_all();
    assert!(!cache.contains("k1"));
    assert!(!cache.contains("k2"));
    assert_eq!(cache.disk_cache().count(), 0);
}

#[test]
fn inline_and_external_storage_both_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = CacheConfig::default();
    config.disk_inline_threshold = 8;
    let cache = open(&dir, config);

    cache.set("small", b"tiny".to_vec());
    cache.set("large", b"a value longer than eight bytes".to_vec());

    assert_eq!(cache.get("small"), Some(b"tiny".to_vec()));
    assert_eq!(
        cache.get("large"),
        Some(b"a value longer than eight bytes".to_vec())
    );
}

#[tokio::test]
async fn async_set_then_get_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open(&dir, CacheConfig::default());

    let (tx, rx) = tokio::sync::oneshot::channel();
    cache.set_async("k", b"v".to_vec(), move || {
        let _ = tx.send(());
    });
    rx.await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    cache.get_async("k", move |key, value| {
        let _ = tx.send((key, value));
    });
    let (key, value) = rx.await.unwrap();
    assert_eq!(key, "k");
    assert_eq!(value, Some(b"v".to_vec()));
}

#[tokio::test]
async fn async_remove_all_reports_completion() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open(&dir, CacheConfig::default());
    cache.set("k", b"v".to_vec());

    let (tx, rx) = tokio::sync::oneshot::channel();
    cache.remove_all_async(|_, _| {}, move |errored| {
        let _ = tx.send(errored);
    });
    assert_eq!(rx.await.unwrap(), false);
    assert!(!cache.contains("k"));
}

#[tokio::test]
async fn async_contains_and_remove_carry_the_key() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open(&dir, CacheConfig::default());
    cache.set("k", b"v".to_vec());

    let (tx, rx) = tokio::sync::oneshot::channel();
    cache.contains_async("k", move |key, present| {
        let _ = tx.send((key, present));
    });
    let (key, present) = rx.await.unwrap();
    assert_eq!(key, "k");
    assert!(present);

    let (tx, rx) = tokio::sync::oneshot::channel();
    cache.remove_async("k", move |key| {
        let _ = tx.send(key);
    });
    assert_eq!(rx.await.unwrap(), "k");
    assert!(!cache.contains("k"));
}

//! # KV Storage Engine
//!
//! Purpose: the persistent tier's manifest — a SQLite database mapping
//! non-empty string keys to either an inline blob or an external file under
//! `data/`, per storage-type contract. Connections open lazily on first use
//! and back off on repeated open failures rather than retrying every call;
//! statement text is reused through `rusqlite`'s built-in prepared
//! statement cache (`Connection::prepare_cached`) instead of a hand-rolled
//! one, since that is exactly the "SQL text prepared once per handle and
//! reused" scheme described in the design.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use duocache_common::{require_non_empty, CacheError, CacheResult, StorageType};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::item::{KVStorageItem, KVStorageItemInfo};
use crate::trash::TrashDrainer;

const STATEMENT_CACHE_CAPACITY: usize = 32;
const MAX_BACKOFF_FAILURES: u32 = 10;
const BASE_BACKOFF: Duration = Duration::from_millis(100);
/// The most rows a single `remove_items_to_fit_*` round will scan as
/// eviction candidates, bounding lock hold time on a large overshoot. Each
/// round still evicts only as many of those candidates as the remaining
/// deficit actually needs, not the whole batch.
const EVICTION_BATCH: usize = 32;

/// How far over a `remove_items_to_fit_*` bound the store currently is.
/// `Rows` counts entries directly (for the count bound); `Bytes` counts
/// payload size (for the size bound) and needs per-row sizes to know how
/// many oldest rows cover it, since rows vary in size.
enum Deficit {
    Rows(u64),
    Bytes(u64),
}

impl Deficit {
    fn is_zero(&self) -> bool {
        matches!(self, Deficit::Rows(0) | Deficit::Bytes(0))
    }

    /// Picks the oldest-first prefix of `rows` that closes this deficit:
    /// exactly `n` rows for a row deficit, or the shortest prefix whose
    /// cumulative size reaches the byte deficit. If `rows` (already capped
    /// at `EVICTION_BATCH`) doesn't cover the whole deficit, every row in
    /// the batch is returned and the next round measures what's left.
    fn rows_to_evict(&self, rows: Vec<(String, u64)>) -> Vec<String> {
        match *self {
            Deficit::Rows(n) => rows
                .into_iter()
                .take(n as usize)
                .map(|(key, _)| key)
                .collect(),
            Deficit::Bytes(remaining) => {
                let mut covered = 0u64;
                let mut victims = Vec::new();
                for (key, size) in rows {
                    if covered >= remaining {
                        break;
                    }
                    covered += size;
                    victims.push(key);
                }
                victims
            }
        }
    }
}

struct OpenState {
    conn: Option<Connection>,
    failures: u32,
    next_retry_at: Option<Instant>,
}

/// The manifest database plus the `data/`/`trash/` directories it governs.
pub struct KvStorageEngine {
    root: PathBuf,
    data_dir: PathBuf,
    trash_dir: PathBuf,
    storage_type: StorageType,
    open: Mutex<OpenState>,
    trash: TrashDrainer,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl KvStorageEngine {
    /// Creates an engine rooted at `root`. The manifest is not opened until
    /// the first call that needs it; `data/` and `trash/` are created here
    /// since a crash-recovery sweep of `trash/` has to happen regardless of
    /// whether the manifest itself ever opens successfully.
    pub fn new(root: impl Into<PathBuf>, storage_type: StorageType) -> CacheResult<Self> {
        let root = root.into();
        let data_dir = root.join("data");
        let trash_dir = root.join("trash");
        std::fs::create_dir_all(&data_dir).map_err(|e| CacheError::filesystem(&data_dir, e))?;
        std::fs::create_dir_all(&trash_dir).map_err(|e| CacheError::filesystem(&trash_dir, e))?;

        let trash = TrashDrainer::spawn();
        trash.reclaim_existing(&trash_dir);

        Ok(KvStorageEngine {
            root,
            data_dir,
            trash_dir,
            storage_type,
            open: Mutex::new(OpenState {
                conn: None,
                failures: 0,
                next_retry_at: None,
            }),
            trash,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.sqlite")
    }

    /// Drops the connection, finalising every cached prepared statement.
    /// The next operation reopens lazily, same as a fresh engine.
    pub fn close(&self) {
        self.open.lock().conn = None;
    }

    fn ensure_open<'a>(&self, state: &'a mut OpenState) -> CacheResult<&'a Connection> {
        if state.conn.is_none() {
            if let Some(retry_at) = state.next_retry_at {
                if Instant::now() < retry_at {
                    return Err(CacheError::storage_open(
                        self.manifest_path(),
                        "backing off after a prior open failure",
                    ));
                }
            }
            match self.open_connection() {
                Ok(conn) => {
                    state.conn = Some(conn);
                    state.failures = 0;
                    state.next_retry_at = None;
                }
                Err(err) => {
                    state.failures = state.failures.saturating_add(1);
                    let exponent = state.failures.min(MAX_BACKOFF_FAILURES);
                    state.next_retry_at =
                        Some(Instant::now() + BASE_BACKOFF * 2u32.saturating_pow(exponent));
                    tracing::warn!(failures = state.failures, %err, "manifest open failed");
                    return Err(err);
                }
            }
        }
        Ok(state.conn.as_ref().expect("just ensured"))
    }

    fn open_connection(&self) -> CacheResult<Connection> {
        let path = self.manifest_path();
        let conn = Connection::open(&path)
            .map_err(|e| CacheError::storage_open(&path, e.to_string()))?;
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| CacheError::storage_open(&path, e.to_string()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| CacheError::storage_open(&path, e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS manifest (
                key TEXT PRIMARY KEY,
                filename TEXT,
                inline_data BLOB,
                size INTEGER NOT NULL,
                modification_time INTEGER NOT NULL,
                last_access_time INTEGER NOT NULL,
                extended_data BLOB
            );
            CREATE INDEX IF NOT EXISTS idx_manifest_last_access
                ON manifest(last_access_time);
            CREATE INDEX IF NOT EXISTS idx_manifest_modification
                ON manifest(modification_time);
            CREATE INDEX IF NOT EXISTS idx_manifest_size
                ON manifest(size);",
        )
        .map_err(|e| CacheError::storage_open(&path, e.to_string()))?;
        Ok(conn)
    }

    fn validate_filename_contract(&self, filename: Option<&str>) -> CacheResult<()> {
        match (self.storage_type, filename) {
            (StorageType::File, None) => {
                Err(CacheError::invalid("file storage requires a filename"))
            }
            (StorageType::Sqlite, Some(_)) => Err(CacheError::invalid(
                "sqlite storage must not receive a filename",
            )),
            _ => Ok(()),
        }
    }

    /// Writes `value` to an external file under `data/` via write-then-
    /// rename so a reader never observes a partially written payload.
    fn write_external(&self, filename: &str, value: &[u8]) -> CacheResult<()> {
        let target = self.data_dir.join(filename);
        let tmp = self.data_dir.join(format!("{filename}.{}.tmp", Uuid::new_v4()));
        std::fs::write(&tmp, value).map_err(|e| CacheError::filesystem(&tmp, e))?;
        std::fs::rename(&tmp, &target).map_err(|e| CacheError::filesystem(&target, e))
    }

    fn remove_external_best_effort(&self, filename: &str) {
        let path = self.data_dir.join(filename);
        if let Err(err) = std::fs::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(?path, %err, "failed to remove external payload file");
            }
        }
    }

    /// Inserts or replaces the row for `key`. `filename` selects inline vs.
    /// external storage for this write; `extended_data` is an opaque,
    /// caller-owned byte sequence persisted alongside the row.
    pub fn save(
        &self,
        key: &str,
        value: &[u8],
        filename: Option<&str>,
        extended_data: Option<&[u8]>,
    ) -> bool {
        match self.try_save(key, value, filename, extended_data) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%key, %err, "disk save failed");
                false
            }
        }
    }

    fn try_save(
        &self,
        key: &str,
        value: &[u8],
        filename: Option<&str>,
        extended_data: Option<&[u8]>,
    ) -> CacheResult<()> {
        require_non_empty(key.as_bytes(), value)?;
        self.validate_filename_contract(filename)?;

        if let Some(filename) = filename {
            self.write_external(filename, value)?;
        }

        let mut state = self.open.lock();
        let conn = self.ensure_open(&mut state)?;
        let now = now_unix();
        let inline_data = if filename.is_none() { Some(value) } else { None };
        conn.prepare_cached(
            "INSERT INTO manifest
                (key, filename, inline_data, size, modification_time, last_access_time, extended_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)
             ON CONFLICT(key) DO UPDATE SET
                filename = excluded.filename,
                inline_data = excluded.inline_data,
                size = excluded.size,
                modification_time = excluded.modification_time,
                last_access_time = excluded.last_access_time,
                extended_data = excluded.extended_data",
        )
        .and_then(|mut stmt| {
            stmt.execute(params![
                key,
                filename,
                inline_data,
                value.len() as i64,
                now,
                extended_data,
            ])
        })
        .map_err(|e| CacheError::storage_exec(e.to_string()))?;
        Ok(())
    }

    fn load_row(&self, conn: &Connection, key: &str) -> CacheResult<Option<KVStorageItem>> {
        conn.prepare_cached(
            "SELECT filename, inline_data, size, modification_time, last_access_time, extended_data
             FROM manifest WHERE key = ?1",
        )
        .and_then(|mut stmt| {
            stmt.query_row(params![key], |row| {
                let filename: Option<String> = row.get(0)?;
                let inline_data: Option<Vec<u8>> = row.get(1)?;
                Ok(KVStorageItem {
                    key: key.to_string(),
                    value: inline_data.unwrap_or_default(),
                    filename,
                    size: row.get::<_, i64>(2)? as u64,
                    modification_time: row.get(3)?,
                    last_access_time: row.get(4)?,
                    extended_data: row.get(5)?,
                })
            })
            .optional()
        })
        .map_err(|e| CacheError::storage_exec(e.to_string()))
    }

    /// Reads the row for `key`, resolving an external filename to its file
    /// contents, and bumps `last_access_time` on a hit. Returns `None` on a
    /// miss or if a row names a file that no longer exists on disk.
    pub fn get(&self, key: &str) -> Option<KVStorageItem> {
        match self.try_get(key) {
            Ok(item) => item,
            Err(err) => {
                tracing::warn!(%key, %err, "disk get failed");
                None
            }
        }
    }

    fn try_get(&self, key: &str) -> CacheResult<Option<KVStorageItem>> {
        let mut state = self.open.lock();
        let conn = self.ensure_open(&mut state)?;
        let Some(mut item) = self.load_row(conn, key)? else {
            return Ok(None);
        };

        if let Some(filename) = item.filename.clone() {
            match std::fs::read(self.data_dir.join(&filename)) {
                Ok(bytes) => item.value = bytes,
                Err(err) => {
                    tracing::warn!(%key, %filename, %err, "external payload file missing");
                    return Ok(None);
                }
            }
        }

        let now = now_unix();
        conn.prepare_cached("UPDATE manifest SET last_access_time = ?1 WHERE key = ?2")
            .and_then(|mut stmt| stmt.execute(params![now, key]))
            .map_err(|e| CacheError::storage_exec(e.to_string()))?;
        item.last_access_time = now;
        Ok(Some(item))
    }

    /// Like [`Self::get`] but never reads the payload off disk and never
    /// bumps `last_access_time` — a metadata probe, not an access.
    pub fn get_info(&self, key: &str) -> Option<KVStorageItemInfo> {
        let result = (|| -> CacheResult<Option<KVStorageItemInfo>> {
            let mut state = self.open.lock();
            let conn = self.ensure_open(&mut state)?;
            conn.prepare_cached(
                "SELECT filename, size, modification_time, last_access_time, extended_data
                 FROM manifest WHERE key = ?1",
            )
            .and_then(|mut stmt| {
                stmt.query_row(params![key], |row| {
                    Ok(KVStorageItemInfo {
                        key: key.to_string(),
                        filename: row.get(0)?,
                        size: row.get::<_, i64>(1)? as u64,
                        modification_time: row.get(2)?,
                        last_access_time: row.get(3)?,
                        extended_data: row.get(4)?,
                    })
                })
                .optional()
            })
            .map_err(|e| CacheError::storage_exec(e.to_string()))
        })();

        match result {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!(%key, %err, "disk get_info failed");
                None
            }
        }
    }

    /// Deletes the row for `key`. Absence is success: removing a key that
    /// is not present returns `true`, matching the "deletes treat absence
    /// as success" rule for external-file operations.
    pub fn remove(&self, key: &str) -> bool {
        match self.try_remove_one(key) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%key, %err, "disk remove failed");
                false
            }
        }
    }

    fn try_remove_one(&self, key: &str) -> CacheResult<()> {
        let mut state = self.open.lock();
        let conn = self.ensure_open(&mut state)?;
        let filename: Option<String> = conn
            .prepare_cached("SELECT filename FROM manifest WHERE key = ?1")
            .and_then(|mut stmt| stmt.query_row(params![key], |row| row.get(0)).optional())
            .map_err(|e| CacheError::storage_exec(e.to_string()))?
            .flatten();
        conn.prepare_cached("DELETE FROM manifest WHERE key = ?1")
            .and_then(|mut stmt| stmt.execute(params![key]))
            .map_err(|e| CacheError::storage_exec(e.to_string()))?;
        drop(state);
        if let Some(filename) = filename {
            self.remove_external_best_effort(&filename);
        }
        Ok(())
    }

    /// Removes every key in `keys` in a single transaction.
    pub fn remove_many(&self, keys: &[String]) -> bool {
        match self.try_remove_many(keys) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "disk remove_many failed");
                false
            }
        }
    }

    fn try_remove_many(&self, keys: &[String]) -> CacheResult<()> {
        let mut state = self.open.lock();
        let conn = self.ensure_open(&mut state)?;
        let mut filenames = Vec::new();
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| CacheError::storage_exec(e.to_string()))?;
        for key in keys {
            let filename: Option<String> = tx
                .prepare_cached("SELECT filename FROM manifest WHERE key = ?1")
                .and_then(|mut stmt| stmt.query_row(params![key], |row| row.get(0)).optional())
                .map_err(|e| CacheError::storage_exec(e.to_string()))?
                .flatten();
            tx.prepare_cached("DELETE FROM manifest WHERE key = ?1")
                .and_then(|mut stmt| stmt.execute(params![key]))
                .map_err(|e| CacheError::storage_exec(e.to_string()))?;
            if let Some(filename) = filename {
                filenames.push(filename);
            }
        }
        tx.commit().map_err(|e| CacheError::storage_exec(e.to_string()))?;
        drop(state);
        for filename in filenames {
            self.remove_external_best_effort(&filename);
        }
        Ok(())
    }

    /// Removes every row whose `size` exceeds `size`.
    pub fn remove_items_larger_than(&self, size: u64) -> bool {
        self.remove_where("size > ?1", size as i64)
    }

    /// Removes every row whose `modification_time` is earlier than `time`.
    pub fn remove_items_earlier_than(&self, time: i64) -> bool {
        self.remove_where("modification_time < ?1", time)
    }

    fn remove_where(&self, predicate: &str, bound: i64) -> bool {
        match self.try_remove_where(predicate, bound) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, predicate, "disk predicate removal failed");
                false
            }
        }
    }

    fn try_remove_where(&self, predicate: &str, bound: i64) -> CacheResult<()> {
        let mut state = self.open.lock();
        let conn = self.ensure_open(&mut state)?;
        let mut filenames = Vec::new();
        {
            let mut stmt = conn
                .prepare_cached(&format!("SELECT filename FROM manifest WHERE {predicate}"))
                .map_err(|e| CacheError::storage_exec(e.to_string()))?;
            let mut rows = stmt
                .query(params![bound])
                .map_err(|e| CacheError::storage_exec(e.to_string()))?;
            while let Some(row) = rows.next().map_err(|e| CacheError::storage_exec(e.to_string()))? {
                if let Some(filename) = row.get::<_, Option<String>>(0).map_err(|e| CacheError::storage_exec(e.to_string()))? {
                    filenames.push(filename);
                }
            }
        }
        conn.prepare_cached(&format!("DELETE FROM manifest WHERE {predicate}"))
            .and_then(|mut stmt| stmt.execute(params![bound]))
            .map_err(|e| CacheError::storage_exec(e.to_string()))?;
        drop(state);
        for filename in filenames {
            self.remove_external_best_effort(&filename);
        }
        Ok(())
    }

    /// Evicts least-recently-accessed rows, in LRU order, until the total
    /// payload size is at or below `max_size`.
    pub fn remove_items_to_fit_size(&self, max_size: u64) -> bool {
        self.trim_by_lru(move |engine, conn| {
            let total = engine.total_size_locked(conn)?;
            Ok(Deficit::Bytes(total.saturating_sub(max_size)))
        })
    }

    /// Evicts least-recently-accessed rows, in LRU order, until the row
    /// count is at or below `max_count`.
    pub fn remove_items_to_fit_count(&self, max_count: u64) -> bool {
        self.trim_by_lru(move |engine, conn| {
            let count = engine.count_locked(conn)?;
            Ok(Deficit::Rows(count.saturating_sub(max_count)))
        })
    }

    /// Shared driver for the two `remove_items_to_fit_*` operations:
    /// `deficit` reports how far over the bound the store currently is —
    /// `Deficit::Rows(0)`/`Deficit::Bytes(0)` means within bound. Each round
    /// evicts only as many of the oldest rows as are needed to close that
    /// deficit — capped at `EVICTION_BATCH` per round so a large overshoot
    /// still bounds lock hold time — then re-measures, rather than
    /// deleting a whole fixed-size batch regardless of how small the
    /// remaining deficit is.
    fn trim_by_lru(&self, mut deficit: impl FnMut(&Self, &Connection) -> CacheResult<Deficit>) -> bool {
        loop {
            let mut state = self.open.lock();
            let conn = match self.ensure_open(&mut state) {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::warn!(%err, "disk trim failed to open manifest");
                    return false;
                }
            };
            let remaining = match deficit(self, conn) {
                Ok(remaining) => remaining,
                Err(err) => {
                    tracing::warn!(%err, "disk trim limit check failed");
                    return false;
                }
            };
            if remaining.is_zero() {
                return true;
            }

            let rows = match self.oldest_rows_locked(conn, EVICTION_BATCH) {
                Ok(rows) => rows,
                Err(err) => {
                    tracing::warn!(%err, "disk trim victim scan failed");
                    return false;
                }
            };
            if rows.is_empty() {
                return true;
            }

            let victims = remaining.rows_to_evict(rows);
            drop(state);
            if self.try_remove_many(&victims).is_err() {
                return false;
            }
        }
    }

    fn oldest_rows_locked(&self, conn: &Connection, limit: usize) -> CacheResult<Vec<(String, u64)>> {
        let mut stmt = conn
            .prepare_cached("SELECT key, size FROM manifest ORDER BY last_access_time ASC LIMIT ?1")
            .map_err(|e| CacheError::storage_exec(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(|e| CacheError::storage_exec(e.to_string()))?;
        rows.collect::<Result<Vec<(String, u64)>, _>>()
            .map_err(|e| CacheError::storage_exec(e.to_string()))
    }

    fn oldest_keys_locked(&self, conn: &Connection, limit: usize) -> CacheResult<Vec<String>> {
        let mut stmt = conn
            .prepare_cached("SELECT key FROM manifest ORDER BY last_access_time ASC LIMIT ?1")
            .map_err(|e| CacheError::storage_exec(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get(0))
            .map_err(|e| CacheError::storage_exec(e.to_string()))?;
        rows.collect::<Result<Vec<String>, _>>()
            .map_err(|e| CacheError::storage_exec(e.to_string()))
    }

    fn count_locked(&self, conn: &Connection) -> CacheResult<u64> {
        conn.query_row("SELECT COUNT(*) FROM manifest", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| CacheError::storage_exec(e.to_string()))
    }

    fn total_size_locked(&self, conn: &Connection) -> CacheResult<u64> {
        conn.query_row("SELECT COALESCE(SUM(size), 0) FROM manifest", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as u64)
        .map_err(|e| CacheError::storage_exec(e.to_string()))
    }

    pub fn count(&self) -> u64 {
        let mut state = self.open.lock();
        match self.ensure_open(&mut state).and_then(|conn| self.count_locked(conn)) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(%err, "disk count failed");
                0
            }
        }
    }

    pub fn total_size(&self) -> u64 {
        let mut state = self.open.lock();
        match self
            .ensure_open(&mut state)
            .and_then(|conn| self.total_size_locked(conn))
        {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(%err, "disk total_size failed");
                0
            }
        }
    }

    /// Clears the manifest and its content directory. Tries the swap-to-
    /// trash protocol first (rename `data/`, recreate it empty, truncate
    /// the manifest, hand the old subtree to the trash drainer) so the
    /// caller-visible latency does not scale with the number of external
    /// files; falls back to a row-by-row delete with progress reporting if
    /// the rename fails (e.g. `data/` and `trash/` on different
    /// filesystems).
    pub fn remove_all(&self) -> bool {
        self.remove_all_with_progress(|_, _| {}, |_| {})
    }

    pub fn remove_all_with_progress(
        &self,
        progress: impl Fn(u64, u64),
        end: impl FnOnce(bool),
    ) -> bool {
        match self.try_swap_to_trash() {
            Ok(total) => {
                progress(total, total);
                end(false);
                true
            }
            Err(swap_err) => {
                tracing::warn!(%swap_err, "swap-to-trash failed, falling back to row-by-row clear");
                match self.remove_all_row_by_row(&progress) {
                    Ok(()) => {
                        end(false);
                        true
                    }
                    Err(err) => {
                        tracing::warn!(%err, "row-by-row clear failed");
                        end(true);
                        false
                    }
                }
            }
        }
    }

    fn try_swap_to_trash(&self) -> CacheResult<u64> {
        let mut state = self.open.lock();
        let conn = self.ensure_open(&mut state)?;
        let total = self.count_locked(conn)?;

        let trash_subdir = self.trash_dir.join(Uuid::new_v4().to_string());
        std::fs::rename(&self.data_dir, &trash_subdir)
            .map_err(|e| CacheError::filesystem(&self.data_dir, e))?;
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| CacheError::filesystem(&self.data_dir, e))?;
        conn.execute("DELETE FROM manifest", [])
            .map_err(|e| CacheError::storage_exec(e.to_string()))?;
        drop(state);
        self.trash.schedule(trash_subdir);
        Ok(total)
    }

    fn remove_all_row_by_row(&self, progress: &impl Fn(u64, u64)) -> CacheResult<()> {
        let total = {
            let mut state = self.open.lock();
            let conn = self.ensure_open(&mut state)?;
            self.count_locked(conn)?
        };
        let mut done = 0u64;
        loop {
            let mut state = self.open.lock();
            let conn = self.ensure_open(&mut state)?;
            let keys = self.oldest_keys_locked(conn, EVICTION_BATCH)?;
            if keys.is_empty() {
                break;
            }
            drop(state);
            self.try_remove_many(&keys)?;
            done += keys.len() as u64;
            progress(done, total);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(dir: &tempfile::TempDir) -> KvStorageEngine {
        KvStorageEngine::new(dir.path(), StorageType::Mixed).unwrap()
    }

    #[test]
    fn save_and_get_round_trip_inline() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        assert!(engine.save("k", b"v", None, None));
        let item = engine.get("k").unwrap();
        assert_eq!(item.value, b"v");
        assert!(item.filename.is_none());
    }

    #[test]
    fn save_and_get_round_trip_external() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        assert!(engine.save("k", b"payload", Some("k.bin"), None));
        assert!(dir.path().join("data/k.bin").exists());
        let item = engine.get("k").unwrap();
        assert_eq!(item.value, b"payload");
        assert_eq!(item.filename.as_deref(), Some("k.bin"));
    }

    #[test]
    fn get_miss_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        assert!(engine.get("missing").is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.save("k", b"v", None, None);
        assert!(engine.remove("k"));
        assert!(engine.remove("k"));
        assert!(engine.get("k").is_none());
    }

    #[test]
    fn remove_external_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.save("k", b"v", Some("k.bin"), None);
        assert!(engine.remove("k"));
        assert!(!dir.path().join("data/k.bin").exists());
    }

    #[test]
    fn file_storage_requires_filename() {
        let dir = tempfile::tempdir().unwrap();
        let engine = KvStorageEngine::new(dir.path(), StorageType::File).unwrap();
        assert!(!engine.save("k", b"v", None, None));
    }

    #[test]
    fn sqlite_storage_rejects_filename() {
        let dir = tempfile::tempdir().unwrap();
        let engine = KvStorageEngine::new(dir.path(), StorageType::Sqlite).unwrap();
        assert!(!engine.save("k", b"v", Some("nope.bin"), None));
    }

    #[test]
    fn remove_items_to_fit_count_evicts_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        for i in 0..5 {
            engine.save(&format!("k{i}"), b"v", None, None);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(engine.remove_items_to_fit_count(2));
        assert_eq!(engine.count(), 2);
        assert!(engine.get("k3").is_some());
        assert!(engine.get("k4").is_some());
        assert!(engine.get("k0").is_none());
    }

    #[test]
    fn remove_items_to_fit_size_evicts_until_under_budget() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        for i in 0..4 {
            engine.save(&format!("k{i}"), b"1234567890", None, None);
        }
        assert!(engine.remove_items_to_fit_size(25));
        assert!(engine.total_size() <= 25);
    }

    #[test]
    fn remove_all_clears_manifest_and_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.save("k1", b"v", Some("k1.bin"), None);
        engine.save("k2", b"v", None, None);
        assert!(engine.remove_all());
        assert_eq!(engine.count(), 0);
        assert!(engine.get("k1").is_none());
        assert!(engine.get("k2").is_none());

        // the directory still exists and is usable right away
        assert!(engine.save("k3", b"v", None, None));
        assert!(engine.get("k3").is_some());
    }

    #[test]
    fn extended_data_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.save("k", b"v", None, Some(b"meta"));
        let item = engine.get("k").unwrap();
        assert_eq!(item.extended_data.as_deref(), Some(&b"meta"[..]));
    }

    #[test]
    fn get_info_does_not_load_payload_or_bump_access_time() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.save("k", b"v", None, None);
        let before = engine.get_info("k").unwrap().last_access_time;
        std::thread::sleep(Duration::from_millis(1100));
        let info = engine.get_info("k").unwrap();
        assert_eq!(info.last_access_time, before);
    }
}

//! Content-addressed cache.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/manifest.json            metadata of every live entry (no content)
//! <root>/<namespace>/<uuid>.cache JSON content of one entry
//! ```
//!
//! Entries are keyed by `(namespace, id)` where `id` is normally a
//! [`Cache::hash`] of the inputs that produced the value. Content is loaded
//! from disk lazily, TTL is checked at read time, and the manifest is
//! rewritten in full on every save.

use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

pub const DEFAULT_TTL_SECS: u64 = 60 * 60 * 24 * 7;

const MANIFEST_FILE: &str = "manifest.json";
const ENTRY_EXTENSION: &str = "cache";
// ~100 years, keeps chrono arithmetic in range
const MAX_TTL_SECS: u64 = 3_155_760_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub uuid: Uuid,
    pub namespace: String,
    pub id: String,
    pub cached_at: DateTime<Utc>,
    pub ttl_sec: u64,
    #[serde(skip)]
    pub content: Option<serde_json::Value>,
    #[serde(skip)]
    pub is_saved: bool,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::seconds(self.ttl_sec.min(MAX_TTL_SECS) as i64);
        match self.cached_at.checked_add_signed(ttl) {
            Some(expires_at) => expires_at < now,
            None => false,
        }
    }
}

/// Outcome of [`Cache::get_with`].
#[derive(Debug, PartialEq)]
pub enum Lookup<T, S> {
    /// A live entry existed; its stored (serialized) form is returned.
    Hit(S),
    /// The fallback ran and produced a value, which is now stored.
    Computed(T),
    /// The fallback ran and produced nothing; nothing was stored.
    Absent,
}

type EntryKey = (String, String);

pub struct Cache {
    root: PathBuf,
    default_ttl_secs: u64,
    entries: Mutex<HashMap<EntryKey, CacheEntry>>,
    save_lock: Mutex<()>,
}

impl Cache {
    /// Open (or create) the cache rooted at `root`.
    ///
    /// Manifest entries whose namespace directory no longer exists are
    /// dropped, and entry files the manifest does not reference are deleted.
    pub fn open(root: impl Into<PathBuf>, default_ttl_secs: u64) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CacheError::io(&root, e))?;

        let manifest_path = root.join(MANIFEST_FILE);
        let mut entries = HashMap::new();
        if manifest_path.exists() {
            match read_manifest(&manifest_path) {
                Ok(manifest) => {
                    debug!("Loading {} cached items", manifest.len());
                    let mut namespaces: HashMap<String, bool> = HashMap::new();
                    for mut entry in manifest {
                        let present = *namespaces
                            .entry(entry.namespace.clone())
                            .or_insert_with(|| root.join(&entry.namespace).is_dir());
                        if !present {
                            continue;
                        }
                        entry.content = None;
                        entry.is_saved = true;
                        entries.insert((entry.namespace.clone(), entry.id.clone()), entry);
                    }
                }
                Err(e) => warn!(
                    "Discarding unreadable cache manifest {}: {}",
                    manifest_path.display(),
                    e
                ),
            }
        }

        let cache = Self {
            root,
            default_ttl_secs,
            entries: Mutex::new(entries),
            save_lock: Mutex::new(()),
        };
        cache.prune_orphans();
        cache.save()?;
        Ok(cache)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical cache key: uppercase SHA-256 hex of the JSON serialization
    /// of `value`. Field order of the serialized structure is part of the key.
    pub fn hash<T: Serialize + ?Sized>(value: &T) -> Result<String, CacheError> {
        let bytes = serde_json::to_vec(value)?;
        Ok(sha256_hex(&bytes))
    }

    /// Return the cached value for `(namespace, id)`, or run `fallback`,
    /// store a `Some` result and return it.
    pub fn get<T, F>(&self, namespace: &str, id: &str, fallback: F) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Option<T>,
    {
        if let Some(value) = self.lookup(namespace, id)? {
            return Ok(Some(value));
        }
        match fallback() {
            Some(value) => {
                self.add(namespace, id, &value)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Like [`Cache::get`], but stores `serializer(&value)` instead of the
    /// computed value. The caller gets the computed value on a miss and the
    /// stored form on a hit.
    pub fn get_with<T, S, F, Z>(
        &self,
        namespace: &str,
        id: &str,
        fallback: F,
        serializer: Z,
    ) -> Result<Lookup<T, S>, CacheError>
    where
        S: Serialize + DeserializeOwned,
        F: FnOnce() -> Option<T>,
        Z: FnOnce(&T) -> S,
    {
        if let Some(stored) = self.lookup::<S>(namespace, id)? {
            return Ok(Lookup::Hit(stored));
        }
        match fallback() {
            Some(value) => {
                self.add(namespace, id, &serializer(&value))?;
                Ok(Lookup::Computed(value))
            }
            None => Ok(Lookup::Absent),
        }
    }

    /// Read a live entry. Expired, unreadable and undecodable entries are
    /// evicted and reported as a miss.
    pub fn lookup<T: DeserializeOwned>(&self, namespace: &str, id: &str) -> Result<Option<T>, CacheError> {
        let key = (namespace.to_string(), id.to_string());
        let now = Utc::now();

        let content = {
            let mut entries = self.lock_entries();
            let Some(entry) = entries.get_mut(&key) else {
                return Ok(None);
            };
            if entry.is_expired(now) {
                drop(entries);
                debug!("Cache entry {}/{} expired", namespace, id);
                self.evict(&key)?;
                return Ok(None);
            }
            if entry.content.is_none() {
                let path = self.entry_path(entry);
                match read_entry(&path) {
                    Ok(value) => entry.content = Some(value),
                    Err(e) => {
                        drop(entries);
                        warn!("Unreadable cache entry {}: {}", path.display(), e);
                        self.evict(&key)?;
                        return Ok(None);
                    }
                }
            }
            entry.content.clone()
        };

        let Some(content) = content else {
            return Ok(None);
        };
        match serde_json::from_value(content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Cache entry {}/{} has an unexpected shape: {}", namespace, id, e);
                self.evict(&key)?;
                Ok(None)
            }
        }
    }

    /// Store `value` under `(namespace, id)` with the default TTL, replacing
    /// any live entry for the same pair, and save.
    pub fn add<T: Serialize + ?Sized>(&self, namespace: &str, id: &str, value: &T) -> Result<(), CacheError> {
        self.add_with_ttl(namespace, id, value, self.default_ttl_secs)
    }

    pub fn add_with_ttl<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        id: &str,
        value: &T,
        ttl_sec: u64,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            uuid: Uuid::new_v4(),
            namespace: namespace.to_string(),
            id: id.to_string(),
            cached_at: Utc::now(),
            ttl_sec,
            content: Some(serde_json::to_value(value)?),
            is_saved: false,
        };
        let replaced = self
            .lock_entries()
            .insert((namespace.to_string(), id.to_string()), entry);
        if let Some(old) = replaced {
            self.remove_entry_file(&old);
        }
        self.save()
    }

    /// Write unsaved entry files and rewrite the manifest.
    ///
    /// Saves are serialized through `save_lock`; already-saved entries are
    /// not rewritten.
    pub fn save(&self) -> Result<(), CacheError> {
        let _writer = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (pending, manifest) = {
            let entries = self.lock_entries();
            let pending: Vec<(EntryKey, Uuid, PathBuf, serde_json::Value)> = entries
                .iter()
                .filter(|(_, entry)| !entry.is_saved)
                .filter_map(|(key, entry)| {
                    entry
                        .content
                        .as_ref()
                        .map(|content| (key.clone(), entry.uuid, self.entry_path(entry), content.clone()))
                })
                .collect();
            let mut listed: Vec<&CacheEntry> = entries.values().collect();
            listed.sort_by(|a, b| {
                (&a.namespace, a.cached_at, a.uuid).cmp(&(&b.namespace, b.cached_at, b.uuid))
            });
            (pending, serde_json::to_vec_pretty(&listed)?)
        };

        for (key, uuid, path, content) in &pending {
            let data = serde_json::to_vec(content)?;
            // Held while writing: an `add` replacing this entry either ran
            // before (the file is skipped) or waits and then deletes it.
            let entries = self.lock_entries();
            if entries.get(key).map(|entry| entry.uuid) != Some(*uuid) {
                debug!("Cache entry {} was replaced before it was written", uuid);
                continue;
            }
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;
            }
            fs::write(path, data).map_err(|e| CacheError::io(path, e))?;
        }

        let manifest_path = self.root.join(MANIFEST_FILE);
        let staging = self.root.join(format!("{}.tmp", MANIFEST_FILE));
        fs::write(&staging, manifest).map_err(|e| CacheError::io(&staging, e))?;
        fs::rename(&staging, &manifest_path).map_err(|e| CacheError::io(&manifest_path, e))?;

        let mut entries = self.lock_entries();
        for (key, uuid, _, _) in pending {
            if let Some(entry) = entries.get_mut(&key) {
                if entry.uuid == uuid {
                    entry.is_saved = true;
                }
            }
        }
        Ok(())
    }

    /// Flush and release the cache.
    pub fn close(self) -> Result<(), CacheError> {
        self.save()
    }

    #[cfg(test)]
    pub(crate) fn entry_file(&self, namespace: &str, id: &str) -> Option<PathBuf> {
        self.lock_entries()
            .get(&(namespace.to_string(), id.to_string()))
            .map(|entry| self.entry_path(entry))
    }

    fn evict(&self, key: &EntryKey) -> Result<(), CacheError> {
        let removed = self.lock_entries().remove(key);
        if let Some(entry) = removed {
            self.remove_entry_file(&entry);
        }
        self.save()
    }

    fn remove_entry_file(&self, entry: &CacheEntry) {
        let path = self.entry_path(entry);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to delete cache file {}: {}", path.display(), e);
            }
        }
    }

    fn prune_orphans(&self) {
        let referenced: HashSet<PathBuf> = self
            .lock_entries()
            .values()
            .map(|entry| self.entry_path(entry))
            .collect();

        let orphans: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION))
            .filter(|path| !referenced.contains(path))
            .collect();

        if !orphans.is_empty() {
            debug!("Pruning {} orphaned cache files", orphans.len());
        }
        for path in orphans {
            fs::remove_file(&path).ok();
        }
    }

    fn entry_path(&self, entry: &CacheEntry) -> PathBuf {
        self.root
            .join(&entry.namespace)
            .join(format!("{}.{}", entry.uuid, ENTRY_EXTENSION))
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<EntryKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:X}", Sha256::digest(bytes))
}

fn read_manifest(path: &Path) -> Result<Vec<CacheEntry>, CacheError> {
    let data = fs::read_to_string(path).map_err(|e| CacheError::io(path, e))?;
    Ok(serde_json::from_str(&data)?)
}

fn read_entry(path: &Path) -> Result<serde_json::Value, CacheError> {
    let data = fs::read_to_string(path).map_err(|e| CacheError::io(path, e))?;
    Ok(serde_json::from_str(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Cache {
        Cache::open(dir.path().join("cache"), DEFAULT_TTL_SECS).unwrap()
    }

    #[test]
    fn test_get_runs_fallback_once() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);
        let calls = Cell::new(0);

        for _ in 0..3 {
            let value: Option<String> = cache
                .get("ns", "key", || {
                    calls.set(calls.get() + 1);
                    Some("computed".to_string())
                })
                .unwrap();
            assert_eq!(value.as_deref(), Some("computed"));
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let cache = open(&dir);
            cache.add("ns", "key", &vec![1, 2, 3]).unwrap();
            cache.close().unwrap();
        }

        let cache = open(&dir);
        assert_eq!(cache.len(), 1);
        let value: Option<Vec<u32>> = cache
            .get("ns", "key", || panic!("fallback must not run after reopen"))
            .unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_absent_fallback_is_not_stored() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);
        let value: Option<String> = cache.get("ns", "key", || None).unwrap();
        assert!(value.is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entry_is_recomputed_and_file_removed() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);
        cache.add_with_ttl("ns", "key", "stale", 0).unwrap();
        let stale_file = cache.entry_file("ns", "key").unwrap();
        assert!(stale_file.exists());

        std::thread::sleep(Duration::from_millis(20));

        let value: Option<String> = cache.get("ns", "key", || Some("fresh".to_string())).unwrap();
        assert_eq!(value.as_deref(), Some("fresh"));
        assert!(!stale_file.exists());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_add_replaces_existing_pair() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);
        cache.add("ns", "key", "first").unwrap();
        let first_file = cache.entry_file("ns", "key").unwrap();
        cache.add("ns", "key", "second").unwrap();

        assert_eq!(cache.len(), 1);
        assert!(!first_file.exists());
        let value: Option<String> = cache.lookup("ns", "key").unwrap();
        assert_eq!(value.as_deref(), Some("second"));
    }

    #[test]
    fn test_concurrent_adds_leave_one_file() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let cache = &cache;
                scope.spawn(move || {
                    for round in 0..25 {
                        cache.add("ns", "key", &format!("{}-{}", worker, round)).unwrap();
                    }
                });
            }
        });

        let files: Vec<_> = fs::read_dir(dir.path().join("cache").join("ns"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files, vec![cache.entry_file("ns", "key").unwrap()]);
    }

    #[test]
    fn test_missing_namespace_directory_drops_entries() {
        let dir = TempDir::new().unwrap();
        {
            let cache = open(&dir);
            cache.add("keep", "a", "1").unwrap();
            cache.add("gone", "b", "2").unwrap();
            cache.close().unwrap();
        }
        fs::remove_dir_all(dir.path().join("cache").join("gone")).unwrap();

        let cache = open(&dir);
        assert_eq!(cache.len(), 1);
        let gone: Option<String> = cache.lookup("gone", "b").unwrap();
        assert!(gone.is_none());
        let kept: Option<String> = cache.lookup("keep", "a").unwrap();
        assert_eq!(kept.as_deref(), Some("1"));
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let path = {
            let cache = open(&dir);
            cache.add("ns", "key", "value").unwrap();
            let path = cache.entry_file("ns", "key").unwrap();
            cache.close().unwrap();
            path
        };
        fs::write(&path, "{not json").unwrap();

        let cache = open(&dir);
        let value: Option<String> = cache.get("ns", "key", || Some("recomputed".to_string())).unwrap();
        assert_eq!(value.as_deref(), Some("recomputed"));
    }

    #[test]
    fn test_orphaned_files_are_pruned() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        fs::create_dir_all(root.join("ns")).unwrap();
        let orphan = root.join("ns").join("deadbeef.cache");
        fs::write(&orphan, "\"x\"").unwrap();

        let _cache = open(&dir);
        assert!(!orphan.exists());
    }

    #[test]
    fn test_get_with_returns_stored_form_on_hit() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);

        let first: Lookup<Vec<u8>, usize> = cache
            .get_with("ns", "key", || Some(vec![1u8, 2, 3]), |v| v.len())
            .unwrap();
        assert_eq!(first, Lookup::Computed(vec![1, 2, 3]));

        let second: Lookup<Vec<u8>, usize> = cache
            .get_with("ns", "key", || Some(vec![9u8]), |v| v.len())
            .unwrap();
        assert_eq!(second, Lookup::Hit(3));
    }

    #[test]
    fn test_hash_is_uppercase_and_stable() {
        #[derive(Serialize)]
        struct Key<'a> {
            id: &'a str,
            chunk: &'a str,
        }
        let a = Cache::hash(&Key { id: "1", chunk: "2" }).unwrap();
        let b = Cache::hash(&Key { id: "1", chunk: "2" }).unwrap();
        let c = Cache::hash(&Key { id: "2", chunk: "1" }).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_digit() || ch.is_ascii_uppercase()));
    }
}

//! Cache Persistence Module
//!
//! Mirrors a cache to a JSON file so warm entries survive restarts. The file
//! is a JSON object mapping key to entry, listed least recently used first.
//! Persistence is best-effort: I/O and parse failures are logged and the cache
//! keeps working in memory.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::cache::CacheEntry;

// == Persist Mode ==
/// When mutations reach the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Rewrite the file after every mutating operation
    #[default]
    WriteThrough,
    /// Mark the cache dirty; the file is rewritten on `flush`
    Deferred,
}

// == Cache Persistence ==
/// JSON file mirror for one cache.
#[derive(Debug, Clone)]
pub struct CachePersistence {
    path: PathBuf,
    mode: PersistMode,
}

impl CachePersistence {
    pub fn new(path: impl Into<PathBuf>, mode: PersistMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> PersistMode {
        self.mode
    }

    // == Load ==
    /// Reads the snapshot, dropping entries already expired at `now`.
    ///
    /// Returns entries oldest-first. A missing file yields an empty list.
    pub fn load(&self, now: f64) -> Vec<(String, CacheEntry)> {
        if !self.path.exists() {
            return Vec::new();
        }

        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read cache snapshot");
                return Vec::new();
            }
        };

        let snapshot: IndexMap<String, CacheEntry> = match serde_json::from_slice(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to parse cache snapshot");
                return Vec::new();
            }
        };

        let entries: Vec<(String, CacheEntry)> = snapshot
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .collect();

        info!(
            path = %self.path.display(),
            count = entries.len(),
            "Loaded persisted cache entries"
        );
        entries
    }

    // == Save ==
    /// Rewrites the snapshot with every entry still live at `now`.
    ///
    /// Returns false when the write failed.
    pub fn save<'a, I>(&self, entries: I, now: f64) -> bool
    where
        I: IntoIterator<Item = (&'a String, &'a CacheEntry)>,
    {
        let snapshot: IndexMap<&String, &CacheEntry> = entries
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .collect();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!(path = %parent.display(), error = %e, "Failed to create cache directory");
                    return false;
                }
            }
        }

        let bytes = match serde_json::to_vec_pretty(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to serialize cache snapshot");
                return false;
            }
        };

        match fs::write(&self.path, bytes) {
            Ok(()) => {
                debug!(path = %self.path.display(), count = snapshot.len(), "Saved cache snapshot");
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to write cache snapshot");
                false
            }
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = CachePersistence::new(dir.path().join("none.json"), PersistMode::WriteThrough);
        assert!(persistence.load(0.0).is_empty());
    }

    #[test]
    fn test_save_and_load_preserves_order_and_drops_expired() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = CachePersistence::new(dir.path().join("nested/c.json"), PersistMode::WriteThrough);

        let keys = ["b".to_string(), "a".to_string(), "gone".to_string()];
        let entries = [
            CacheEntry::with_created_at(json!(2), Duration::from_secs(100), 1000.0),
            CacheEntry::with_created_at(json!(1), Duration::from_secs(100), 1000.0),
            CacheEntry::with_created_at(json!(0), Duration::from_secs(1), 1000.0),
        ];

        assert!(persistence.save(keys.iter().zip(entries.iter()), 1000.5));

        // "gone" is still live at save time but expired at load time
        let loaded = persistence.load(1050.0);
        let loaded_keys: Vec<&str> = loaded.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(loaded_keys, vec!["b", "a"]);
        assert_eq!(loaded[0].1.value, json!(2));
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();

        let persistence = CachePersistence::new(&path, PersistMode::WriteThrough);
        assert!(persistence.load(0.0).is_empty());
    }

    #[test]
    fn test_save_failure_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        // The target path is an existing directory, so the write must fail
        let persistence = CachePersistence::new(dir.path(), PersistMode::WriteThrough);
        let keys = ["k".to_string()];
        let entries = [CacheEntry::with_created_at(json!(1), Duration::from_secs(10), 0.0)];

        assert!(!persistence.save(keys.iter().zip(entries.iter()), 0.0));
    }
}
